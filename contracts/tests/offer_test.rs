//! Integration tests for the offer escrow against a real ledger.
//!
//! Every flow here goes through `Ledger::apply_transaction`: entry
//! points build their trees from the live ledger state, transactions
//! are assembled and signed at submission time, and assertions check
//! both the outcome balances and the exclusivity guarantees.

use tandem_contracts::error::EscrowError;
use tandem_contracts::offer::OfferEscrow;
use tandem_protocol::crypto::Keypair;
use tandem_protocol::ledger::{
    AccountId, AccountUpdate, Ledger, LedgerError, Receipt, SignedTransaction, TokenId,
    Transaction,
};
use tandem_protocol::tokens::FungibleToken;

const FEE: u64 = 1_000;

// ---------------------------------------------------------------------------
// Test Helpers
// ---------------------------------------------------------------------------

struct Market {
    ledger: Ledger,
    payer: Keypair,
    seller: Keypair,
    seller_id: AccountId,
    buyer: Keypair,
    buyer_id: AccountId,
    token: FungibleToken,
    escrow: OfferEscrow,
}

fn keyed() -> (Keypair, AccountId) {
    let kp = Keypair::generate();
    let id = AccountId::from_public_key(&kp.public_key());
    (kp, id)
}

/// Apply `updates` in one transaction, fee paid by `payer`, with extra
/// signatures from `signers`.
fn apply(
    ledger: &mut Ledger,
    payer: &Keypair,
    updates: Vec<AccountUpdate>,
    signers: &[&Keypair],
) -> Result<Receipt, LedgerError> {
    let payer_id = AccountId::from_public_key(&payer.public_key());
    let mut builder = Transaction::builder(payer_id)
        .fee(FEE)
        .nonce(ledger.account_nonce(&payer_id));
    for update in updates {
        builder = builder.update(update);
    }
    let mut signed = SignedTransaction::new(builder.build()).sign(payer);
    for kp in signers {
        signed = signed.sign(kp);
    }
    ledger.apply_transaction(&signed)
}

/// A ledger with a fee payer, a seller holding 1000 asset units, a
/// buyer holding 200k motes, and one empty offer escrow.
fn market() -> Market {
    let mut ledger = Ledger::new();
    let (payer, payer_id) = keyed();
    let (seller, seller_id) = keyed();
    let (buyer, buyer_id) = keyed();
    let (_, token_owner) = keyed();
    let (_, escrow_account) = keyed();

    ledger.fund(payer_id, TokenId::NATIVE, 1_000_000);
    ledger.fund(buyer_id, TokenId::NATIVE, 200_000);
    ledger.register_token(token_owner);
    let token = FungibleToken::new(token_owner);

    let mint = token.mint(seller_id, 1_000);
    apply(&mut ledger, &payer, vec![mint], &[]).unwrap();

    Market {
        ledger,
        payer,
        seller,
        seller_id,
        buyer,
        buyer_id,
        token,
        escrow: OfferEscrow::new(escrow_account, token),
    }
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

#[test]
fn offer_then_buy_round_trip() {
    let mut m = market();
    let token_id = m.token.token_id();

    // 1. Seller opens: 100 units asking 50k motes.
    let open = m.escrow.offer(&m.ledger, m.seller_id, 100, 50_000).unwrap();
    apply(&mut m.ledger, &m.payer, open, &[&m.seller]).unwrap();

    assert_eq!(m.ledger.balance(&m.seller_id, &token_id), 900);
    assert_eq!(m.ledger.balance(&m.escrow.account(), &token_id), 100);
    let record = m.escrow.record(&m.ledger).unwrap();
    assert_eq!(record.price, 50_000);
    assert_eq!(record.amount, 100);
    assert_eq!(record.owner, m.seller_id);

    // 2. Buyer takes it.
    let buy = m.escrow.buy(&m.ledger, m.buyer_id).unwrap();
    apply(&mut m.ledger, &m.payer, buy, &[&m.buyer]).unwrap();

    assert_eq!(m.ledger.balance(&m.buyer_id, &token_id), 100);
    assert_eq!(m.ledger.balance(&m.escrow.account(), &token_id), 0);
    assert_eq!(m.ledger.balance(&m.seller_id, &TokenId::NATIVE), 50_000);
    assert_eq!(m.ledger.balance(&m.buyer_id, &TokenId::NATIVE), 150_000);
    assert!(m.escrow.record(&m.ledger).unwrap().is_empty());
}

#[test]
fn emptied_escrow_can_host_a_new_offer() {
    let mut m = market();

    let open = m.escrow.offer(&m.ledger, m.seller_id, 100, 50_000).unwrap();
    apply(&mut m.ledger, &m.payer, open, &[&m.seller]).unwrap();
    let buy = m.escrow.buy(&m.ledger, m.buyer_id).unwrap();
    apply(&mut m.ledger, &m.payer, buy, &[&m.buyer]).unwrap();

    // Same contract account, fresh terms.
    let again = m.escrow.offer(&m.ledger, m.seller_id, 50, 9_000).unwrap();
    apply(&mut m.ledger, &m.payer, again, &[&m.seller]).unwrap();
    let record = m.escrow.record(&m.ledger).unwrap();
    assert_eq!(record.amount, 50);
    assert_eq!(record.price, 9_000);
}

// ---------------------------------------------------------------------------
// Exclusivity
// ---------------------------------------------------------------------------

#[test]
fn concurrent_opens_collide_at_apply() {
    let mut m = market();

    // Both trees built against the same empty snapshot.
    let first = m.escrow.offer(&m.ledger, m.seller_id, 100, 50_000).unwrap();
    let second = m.escrow.offer(&m.ledger, m.seller_id, 50, 9_000).unwrap();

    apply(&mut m.ledger, &m.payer, first, &[&m.seller]).unwrap();
    match apply(&mut m.ledger, &m.payer, second, &[&m.seller]) {
        Err(LedgerError::PreconditionMismatch { account, .. }) => {
            assert_eq!(account, m.escrow.account());
        }
        other => panic!("expected PreconditionMismatch, got {other:?}"),
    }

    // The first open won and its terms stand.
    assert_eq!(m.escrow.record(&m.ledger).unwrap().price, 50_000);
}

#[test]
fn only_one_of_two_racing_buyers_wins() {
    let mut m = market();
    let token_id = m.token.token_id();
    let (rival, rival_id) = keyed();
    m.ledger.fund(rival_id, TokenId::NATIVE, 200_000);

    let open = m.escrow.offer(&m.ledger, m.seller_id, 100, 50_000).unwrap();
    apply(&mut m.ledger, &m.payer, open, &[&m.seller]).unwrap();

    // Both buys read the same offered state.
    let buy_rival = m.escrow.buy(&m.ledger, rival_id).unwrap();
    let buy_late = m.escrow.buy(&m.ledger, m.buyer_id).unwrap();

    apply(&mut m.ledger, &m.payer, buy_rival, &[&rival]).unwrap();
    match apply(&mut m.ledger, &m.payer, buy_late, &[&m.buyer]) {
        Err(LedgerError::PreconditionMismatch { .. }) => {}
        other => panic!("expected PreconditionMismatch, got {other:?}"),
    }

    // The rival holds the asset; the late buyer paid nothing.
    assert_eq!(m.ledger.balance(&rival_id, &token_id), 100);
    assert_eq!(m.ledger.balance(&m.buyer_id, &token_id), 0);
    assert_eq!(m.ledger.balance(&m.buyer_id, &TokenId::NATIVE), 200_000);
}

#[test]
fn second_offer_is_refused_at_construction() {
    let mut m = market();
    let open = m.escrow.offer(&m.ledger, m.seller_id, 100, 50_000).unwrap();
    apply(&mut m.ledger, &m.payer, open, &[&m.seller]).unwrap();

    match m.escrow.offer(&m.ledger, m.seller_id, 1, 1) {
        Err(EscrowError::StateGuard { expected, .. }) => assert_eq!(expected, "Empty"),
        other => panic!("expected StateGuard, got {other:?}"),
    }
}

// ---------------------------------------------------------------------------
// Atomicity and Authorization
// ---------------------------------------------------------------------------

#[test]
fn failed_deposit_leaves_no_record() {
    let mut m = market();

    // Seller only holds 1000 units.
    let open = m
        .escrow
        .offer(&m.ledger, m.seller_id, 2_000, 50_000)
        .unwrap();
    match apply(&mut m.ledger, &m.payer, open, &[&m.seller]) {
        Err(LedgerError::InsufficientBalance { available, .. }) => {
            assert_eq!(available, 1_000);
        }
        other => panic!("expected InsufficientBalance, got {other:?}"),
    }

    // The state write was in the same transaction and did not survive.
    assert!(m.escrow.record(&m.ledger).unwrap().is_empty());
    assert_eq!(m.ledger.balance(&m.seller_id, &m.token.token_id()), 1_000);
}

#[test]
fn buy_without_the_buyer_signature_is_rejected() {
    let mut m = market();
    let open = m.escrow.offer(&m.ledger, m.seller_id, 100, 50_000).unwrap();
    apply(&mut m.ledger, &m.payer, open, &[&m.seller]).unwrap();

    let buy = m.escrow.buy(&m.ledger, m.buyer_id).unwrap();
    match apply(&mut m.ledger, &m.payer, buy, &[]) {
        Err(LedgerError::MissingSignature { account, .. }) => {
            assert_eq!(account, m.buyer_id);
        }
        other => panic!("expected MissingSignature, got {other:?}"),
    }

    // Nothing moved.
    assert_eq!(m.ledger.balance(&m.escrow.account(), &m.token.token_id()), 100);
    assert!(!m.escrow.record(&m.ledger).unwrap().is_empty());
}
