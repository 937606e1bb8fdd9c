//! End-to-end settlement tests for the Tandem protocol.
//!
//! These tests exercise the full path from key fixtures through record
//! construction, multi-party signing, submission, and atomic
//! application: delivery-versus-payment settlements, cross-token swaps,
//! replay and splice attempts, stale preconditions, and per-token
//! supply conservation.
//!
//! Each test stands alone with its own chain or ledger. No shared
//! state, no ordering dependencies, no flaky failures.

use tandem_protocol::chain::{
    submit_with_backoff, ChainClient, InclusionStatus, LocalChain, SubmitStatus,
};
use tandem_protocol::crypto::Keypair;
use tandem_protocol::keys::named_accounts;
use tandem_protocol::ledger::{
    AccountId, AccountUpdate, Ledger, LedgerError, LedgerView, SignedTransaction, StateWord,
    TokenId, Transaction,
};
use tandem_protocol::tokens::FungibleToken;

// ---------------------------------------------------------------------------
// Test Helpers
// ---------------------------------------------------------------------------

const FEE: u64 = 1_000;

fn keyed() -> (Keypair, AccountId) {
    let kp = Keypair::generate();
    let id = AccountId::from_public_key(&kp.public_key());
    (kp, id)
}

/// The two roots of a delivery-versus-payment settlement: token moves
/// seller to buyer, native payment moves buyer to seller. Both debits
/// are bound to the transaction, so neither leg is valid anywhere else.
fn delivery_versus_payment(
    token: &FungibleToken,
    seller: AccountId,
    buyer: AccountId,
    amount: u64,
    price: u64,
) -> (AccountUpdate, AccountUpdate) {
    let delivery = token.transfer(seller, buyer, amount);
    let payment = AccountUpdate::builder(buyer)
        .debit(price)
        .signed()
        .bind_to_transaction()
        .label("payment")
        .child(
            AccountUpdate::builder(seller)
                .credit(price)
                .label("payment.credit")
                .build(),
        )
        .build();
    (delivery, payment)
}

// ---------------------------------------------------------------------------
// 1. Full Settlement Lifecycle
// ---------------------------------------------------------------------------

#[tokio::test]
async fn full_settlement_lifecycle() {
    let roster = named_accounts(&["seller", "buyer", "owner"]);
    let (seller, buyer, owner) = (&roster[0], &roster[1], &roster[2]);

    let chain = LocalChain::with_funded_accounts(&[
        (seller.account(), 50_000),
        (buyer.account(), 50_000),
        (owner.account(), 10_000),
    ]);
    let token = FungibleToken::new(owner.account());
    chain.register_token(owner.account());

    // Mint 1000 units to the seller, fee paid by the owner.
    let mint = Transaction::builder(owner.account())
        .fee(FEE)
        .nonce(0)
        .update(token.mint(seller.account(), 1_000))
        .build();
    let mint = SignedTransaction::new(mint).sign(owner.keypair());
    let receipt = submit_with_backoff(&chain, &mint).await.unwrap();
    assert!(receipt.is_pending());

    // Settle 400 units against a 12000 mote payment. Two signers, one
    // transaction.
    let (delivery, payment) =
        delivery_versus_payment(&token, seller.account(), buyer.account(), 400, 12_000);
    let settle = Transaction::builder(buyer.account())
        .fee(FEE)
        .nonce(0)
        .memo("dvp settlement")
        .update(delivery)
        .update(payment)
        .build();
    let settle = SignedTransaction::new(settle)
        .sign(seller.keypair())
        .sign(buyer.keypair());
    assert!(settle.is_fully_signed());

    let submitted = submit_with_backoff(&chain, &settle).await.unwrap();
    let included = match chain.wait_for_inclusion(&submitted.hash).await.unwrap() {
        InclusionStatus::Included { receipt } => receipt,
        other => panic!("expected inclusion, got {other:?}"),
    };
    assert_eq!(included.tx_id, settle.transaction.id());
    assert_eq!(included.height, 2);
    assert_eq!(included.state_root, chain.state_root());

    // Both legs moved, exactly once.
    assert_eq!(chain.balance(&seller.account(), &token.token_id()), 600);
    assert_eq!(chain.balance(&buyer.account(), &token.token_id()), 400);
    assert_eq!(chain.balance(&seller.account(), &TokenId::NATIVE), 62_000);
    assert_eq!(
        chain.balance(&buyer.account(), &TokenId::NATIVE),
        50_000 - 12_000 - FEE
    );

    // Token supply is unchanged by settlement.
    let supply = chain.balance(&seller.account(), &token.token_id())
        + chain.balance(&buyer.account(), &token.token_id());
    assert_eq!(supply, 1_000);
}

// ---------------------------------------------------------------------------
// 2. Failed Settlement Leaves No Trace
// ---------------------------------------------------------------------------

#[tokio::test]
async fn failed_settlement_leaves_no_trace() {
    let (seller_kp, seller) = keyed();
    let (buyer_kp, buyer) = keyed();
    let (_, owner) = keyed();

    // Buyer can cover the fee but not the price.
    let chain = LocalChain::with_funded_accounts(&[(seller, 10_000), (buyer, 2_000)]);
    let token = FungibleToken::new(owner);
    chain.register_token(owner);
    chain.fund(seller, token.token_id(), 500);
    let root_before = chain.state_root();

    let (delivery, payment) = delivery_versus_payment(&token, seller, buyer, 500, 5_000);
    let settle = Transaction::builder(buyer)
        .fee(FEE)
        .nonce(0)
        .update(delivery)
        .update(payment)
        .build();
    let settle = SignedTransaction::new(settle).sign(&seller_kp).sign(&buyer_kp);

    let receipt = chain.submit(&settle).await.unwrap();
    assert!(!receipt.is_pending());

    // Nothing moved. Not the token, not the payment, not even the fee.
    assert_eq!(chain.balance(&seller, &token.token_id()), 500);
    assert_eq!(chain.balance(&buyer, &token.token_id()), 0);
    assert_eq!(chain.balance(&buyer, &TokenId::NATIVE), 2_000);
    assert_eq!(chain.state_root(), root_before);
    assert_eq!(chain.height(), 0);
}

// ---------------------------------------------------------------------------
// 3. Token-for-Token Swap in One Transaction
// ---------------------------------------------------------------------------

#[test]
fn token_for_token_swap_settles_atomically() {
    let mut ledger = Ledger::new();
    let (alice_kp, alice) = keyed();
    let (bob_kp, bob) = keyed();
    let (_, owner_a) = keyed();
    let (_, owner_b) = keyed();

    ledger.fund(alice, TokenId::NATIVE, 10_000);
    ledger.fund(bob, TokenId::NATIVE, 10_000);
    ledger.register_token(owner_a);
    ledger.register_token(owner_b);
    let token_a = FungibleToken::new(owner_a);
    let token_b = FungibleToken::new(owner_b);
    ledger.fund(alice, token_a.token_id(), 500);
    ledger.fund(bob, token_b.token_id(), 400);

    // 120 of A for 80 of B, both legs in one transaction.
    let swap = Transaction::builder(alice)
        .fee(FEE)
        .nonce(0)
        .update(token_a.transfer(alice, bob, 120))
        .update(token_b.transfer(bob, alice, 80))
        .build();
    let swap = SignedTransaction::new(swap).sign(&alice_kp).sign(&bob_kp);
    ledger.apply_transaction(&swap).unwrap();

    assert_eq!(ledger.balance(&alice, &token_a.token_id()), 380);
    assert_eq!(ledger.balance(&bob, &token_a.token_id()), 120);
    assert_eq!(ledger.balance(&bob, &token_b.token_id()), 320);
    assert_eq!(ledger.balance(&alice, &token_b.token_id()), 80);

    // Native only moved for the fee.
    assert_eq!(ledger.balance(&alice, &TokenId::NATIVE), 10_000 - FEE);
    assert_eq!(ledger.balance(&bob, &TokenId::NATIVE), 10_000);
}

// ---------------------------------------------------------------------------
// 4. Bound Records Cannot Be Spliced Across Transactions
// ---------------------------------------------------------------------------

#[test]
fn bound_record_cannot_be_spliced_into_another_transaction() {
    let mut ledger = Ledger::new();
    let (buyer_kp, buyer) = keyed();
    let (mallory_kp, mallory) = keyed();
    let (_, seller) = keyed();
    ledger.fund(buyer, TokenId::NATIVE, 10_000);
    ledger.fund(mallory, TokenId::NATIVE, 10_000);

    let payment = AccountUpdate::builder(buyer)
        .debit(500)
        .signed()
        .bind_to_transaction()
        .label("payment")
        .child(AccountUpdate::builder(seller).credit(500).build())
        .build();

    let tx_a = Transaction::builder(buyer)
        .fee(FEE)
        .nonce(0)
        .update(payment.clone())
        .build();
    let signed_a = SignedTransaction::new(tx_a).sign(&buyer_kp);
    ledger.apply_transaction(&signed_a).unwrap();
    assert_eq!(ledger.balance(&seller, &TokenId::NATIVE), 500);

    // Mallory lifts the identical record, and the buyer's signature
    // slot with it, into her own transaction. The record commitment is
    // unchanged, so the slot key still matches; the signed message does
    // not.
    let tx_b = Transaction::builder(mallory)
        .fee(FEE)
        .nonce(0)
        .update(payment)
        .build();
    let mut signed_b = SignedTransaction::new(tx_b).sign(&mallory_kp);
    signed_b.signatures.extend(signed_a.signatures.clone());

    match ledger.apply_transaction(&signed_b) {
        Err(LedgerError::InvalidSignature { account, .. }) => assert_eq!(account, buyer),
        other => panic!("expected InvalidSignature, got {other:?}"),
    }

    // The seller was paid exactly once.
    assert_eq!(ledger.balance(&seller, &TokenId::NATIVE), 500);
    assert_eq!(ledger.balance(&buyer, &TokenId::NATIVE), 10_000 - 500 - FEE);
}

// ---------------------------------------------------------------------------
// 5. Stale Preconditions After an Interleaving Write
// ---------------------------------------------------------------------------

#[test]
fn stale_precondition_is_rejected_after_interleaving_write() {
    let mut ledger = Ledger::new();
    let (escrow_kp, escrow) = keyed();
    let (payer1_kp, payer1) = keyed();
    let (payer2_kp, payer2) = keyed();
    ledger.fund(payer1, TokenId::NATIVE, 10_000);
    ledger.fund(payer2, TokenId::NATIVE, 10_000);

    let write = |value: u64| {
        AccountUpdate::builder(escrow)
            .signed()
            .write(0, StateWord::from_u64(value))
            .build()
    };

    // The escrow's slot 0 starts at 7.
    let tx = Transaction::builder(payer1)
        .fee(FEE)
        .nonce(0)
        .update(write(7))
        .build();
    let tx = SignedTransaction::new(tx).sign(&payer1_kp).sign(&escrow_kp);
    ledger.apply_transaction(&tx).unwrap();

    // A bundle built against that snapshot pins 7 before writing 8.
    let stale_record = AccountUpdate::builder(escrow)
        .signed()
        .require(0, StateWord::from_u64(7))
        .write(0, StateWord::from_u64(8))
        .build();
    let stale = Transaction::builder(payer2)
        .fee(FEE)
        .nonce(0)
        .update(stale_record)
        .build();
    let stale = SignedTransaction::new(stale).sign(&payer2_kp).sign(&escrow_kp);

    // Someone else moves the slot to 9 first.
    let tx = Transaction::builder(payer1)
        .fee(FEE)
        .nonce(1)
        .update(write(9))
        .build();
    let tx = SignedTransaction::new(tx).sign(&payer1_kp).sign(&escrow_kp);
    ledger.apply_transaction(&tx).unwrap();

    match ledger.apply_transaction(&stale) {
        Err(LedgerError::PreconditionMismatch {
            account,
            slot,
            expected,
            actual,
        }) => {
            assert_eq!(account, escrow);
            assert_eq!(slot, 0);
            assert_eq!(expected, StateWord::from_u64(7));
            assert_eq!(actual, StateWord::from_u64(9));
        }
        other => panic!("expected PreconditionMismatch, got {other:?}"),
    }

    // The slot still holds the interleaved value.
    let snapshot = ledger.fetch_account_state(&escrow, &TokenId::NATIVE);
    assert_eq!(snapshot.word(0), StateWord::from_u64(9));
}

// ---------------------------------------------------------------------------
// 6. Supply Conservation Through Mint, Transfer, Burn
// ---------------------------------------------------------------------------

#[test]
fn mint_transfer_burn_conserves_supply() {
    let mut ledger = Ledger::new();
    let (payer_kp, payer) = keyed();
    let (holder_kp, holder) = keyed();
    let (_, receiver) = keyed();
    let (_, owner) = keyed();
    ledger.fund(payer, TokenId::NATIVE, 100_000);
    ledger.register_token(owner);
    let token = FungibleToken::new(owner);

    let supply = |ledger: &Ledger| {
        ledger.balance(&holder, &token.token_id()) + ledger.balance(&receiver, &token.token_id())
    };

    let apply = |ledger: &mut Ledger, nonce: u64, update: AccountUpdate| {
        let tx = Transaction::builder(payer)
            .fee(FEE)
            .nonce(nonce)
            .update(update)
            .build();
        let tx = SignedTransaction::new(tx).sign(&payer_kp).sign(&holder_kp);
        ledger.apply_transaction(&tx).unwrap();
    };

    apply(&mut ledger, 0, token.mint(holder, 1_000));
    assert_eq!(supply(&ledger), 1_000);

    apply(&mut ledger, 1, token.transfer(holder, receiver, 300));
    assert_eq!(supply(&ledger), 1_000);

    apply(&mut ledger, 2, token.burn(holder, 200));
    assert_eq!(supply(&ledger), 800);
    assert_eq!(ledger.balance(&holder, &token.token_id()), 500);
    assert_eq!(ledger.balance(&receiver, &token.token_id()), 300);
}

#[test]
fn imbalanced_forest_without_supply_authority_is_rejected() {
    let mut ledger = Ledger::new();
    let (payer_kp, payer) = keyed();
    let (holder_kp, holder) = keyed();
    let (_, receiver) = keyed();
    let (_, owner) = keyed();
    ledger.fund(payer, TokenId::NATIVE, 100_000);
    ledger.register_token(owner);
    let token = FungibleToken::new(owner);
    ledger.fund(holder, token.token_id(), 1_000);

    // Debit 30, credit 50. Owner-approved, but the owner record does
    // not authorize a supply change.
    let debit = AccountUpdate::builder(holder)
        .token_id(token.token_id())
        .debit(30)
        .signed()
        .bind_to_transaction()
        .parents_own_token()
        .build();
    let credit = AccountUpdate::builder(receiver)
        .token_id(token.token_id())
        .credit(50)
        .parents_own_token()
        .build();
    let tx = Transaction::builder(payer)
        .fee(FEE)
        .nonce(0)
        .update(token.approve_updates([debit, credit]))
        .build();
    let tx = SignedTransaction::new(tx).sign(&payer_kp).sign(&holder_kp);

    match ledger.apply_transaction(&tx) {
        Err(LedgerError::ConservationViolation { net, .. }) => assert_eq!(net, 20),
        other => panic!("expected ConservationViolation, got {other:?}"),
    }
    assert_eq!(ledger.balance(&holder, &token.token_id()), 1_000);
    assert_eq!(ledger.balance(&receiver, &token.token_id()), 0);
}

// ---------------------------------------------------------------------------
// 7. Fee Payer Nonces Advance Strictly
// ---------------------------------------------------------------------------

#[tokio::test]
async fn fee_payer_nonce_must_advance() {
    let (alice_kp, alice) = keyed();
    let (_, bob) = keyed();
    let chain = LocalChain::with_funded_accounts(&[(alice, 100_000)]);

    let pay = |amount: u64, nonce: u64| {
        let root = AccountUpdate::builder(alice)
            .debit(amount)
            .signed()
            .bind_to_transaction()
            .child(AccountUpdate::builder(bob).credit(amount).build())
            .build();
        let tx = Transaction::builder(alice)
            .fee(FEE)
            .nonce(nonce)
            .update(root)
            .build();
        SignedTransaction::new(tx).sign(&alice_kp)
    };

    assert!(chain.submit(&pay(100, 0)).await.unwrap().is_pending());
    assert!(chain.submit(&pay(200, 1)).await.unwrap().is_pending());
    assert_eq!(chain.account_nonce(&alice), 2);

    // A fresh bundle reusing nonce 1 is refused.
    let replayed = chain.submit(&pay(300, 1)).await.unwrap();
    match &replayed.status {
        SubmitStatus::Rejected { reason } => assert!(reason.contains("nonce")),
        other => panic!("expected rejection, got {other:?}"),
    }
    assert_eq!(chain.height(), 2);
    assert_eq!(chain.balance(&bob, &TokenId::NATIVE), 300);
}

// ---------------------------------------------------------------------------
// 8. Every Application Moves the State Root
// ---------------------------------------------------------------------------

#[tokio::test]
async fn every_application_moves_the_state_root() {
    let (alice_kp, alice) = keyed();
    let (_, bob) = keyed();
    let chain = LocalChain::with_funded_accounts(&[(alice, 100_000)]);
    let genesis_root = chain.state_root();

    let mut roots = vec![genesis_root];
    for nonce in 0..3u64 {
        let root = AccountUpdate::builder(alice)
            .debit(1_000)
            .signed()
            .bind_to_transaction()
            .child(AccountUpdate::builder(bob).credit(1_000).build())
            .build();
        let tx = Transaction::builder(alice)
            .fee(FEE)
            .nonce(nonce)
            .update(root)
            .build();
        let signed = SignedTransaction::new(tx).sign(&alice_kp);

        let submitted = chain.submit(&signed).await.unwrap();
        let receipt = match chain.wait_for_inclusion(&submitted.hash).await.unwrap() {
            InclusionStatus::Included { receipt } => receipt,
            other => panic!("expected inclusion, got {other:?}"),
        };
        assert_eq!(receipt.state_root, chain.state_root());
        roots.push(receipt.state_root);
    }

    // All four roots are distinct: the root commits to balances and
    // nonces, both of which moved every time.
    for i in 0..roots.len() {
        for j in (i + 1)..roots.len() {
            assert_ne!(roots[i], roots[j], "roots {i} and {j} collide");
        }
    }
}
