//! # Fungible token collaborator
//!
//! [`FungibleToken`] is the client-side embodiment of a token owner's
//! contract logic: it builds the owner-approved record trees that move,
//! issue, and retire balances in one token family. It holds no state of
//! its own. Everything it produces is an [`AccountUpdate`] forest that
//! still has to survive the ledger's permission walk and conservation
//! check, where the owner record it plants at the root is exactly what
//! grants its children the right to move the token.
//!
//! Foreign contracts (escrows, for instance) do not get to move token
//! balances by themselves. They hand their records to
//! [`FungibleToken::approve_update`], which adopts them under an owner
//! record; without that adoption the ledger rejects the movement.

use tracing::debug;

use crate::ledger::{AccountId, AccountUpdate, TokenId};

/// Builder of owner-authorized record trees for one token family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FungibleToken {
    owner: AccountId,
    token_id: TokenId,
}

impl FungibleToken {
    /// The token owned by `owner`. The token id is derived, not chosen,
    /// so this is total.
    pub fn new(owner: AccountId) -> Self {
        Self {
            owner,
            token_id: TokenId::derive(&owner),
        }
    }

    /// The owning account.
    pub fn owner(&self) -> AccountId {
        self.owner
    }

    /// The derived token id.
    pub fn token_id(&self) -> TokenId {
        self.token_id
    }

    /// Move `amount` of this token from `from` to `to`.
    ///
    /// The debit is signature-authorized and bound to the full
    /// transaction: the sender endorses this exact transfer in this
    /// exact transaction, so the record cannot be replayed elsewhere.
    /// Insufficient balance surfaces at apply time, not here.
    pub fn transfer(&self, from: AccountId, to: AccountId, amount: u64) -> AccountUpdate {
        debug!(token = %self.token_id, %from, %to, amount, "building token transfer");
        AccountUpdate::builder(self.owner)
            .proved()
            .label("token.transfer")
            .child(
                AccountUpdate::builder(from)
                    .token_id(self.token_id)
                    .debit(amount)
                    .signed()
                    .bind_to_transaction()
                    .parents_own_token()
                    .label("token.transfer.debit")
                    .build(),
            )
            .child(
                AccountUpdate::builder(to)
                    .token_id(self.token_id)
                    .credit(amount)
                    .parents_own_token()
                    .label("token.transfer.credit")
                    .build(),
            )
            .build()
    }

    /// Issue `amount` new units to `to`. The owner record carries the
    /// supply-change gate that conservation checking demands.
    pub fn mint(&self, to: AccountId, amount: u64) -> AccountUpdate {
        debug!(token = %self.token_id, %to, amount, "building token mint");
        AccountUpdate::builder(self.owner)
            .proved()
            .authorize_supply_change()
            .label("token.mint")
            .child(
                AccountUpdate::builder(to)
                    .token_id(self.token_id)
                    .credit(amount)
                    .parents_own_token()
                    .label("token.mint.credit")
                    .build(),
            )
            .build()
    }

    /// Retire `amount` units from `from`, with the holder's signature.
    pub fn burn(&self, from: AccountId, amount: u64) -> AccountUpdate {
        debug!(token = %self.token_id, %from, amount, "building token burn");
        AccountUpdate::builder(self.owner)
            .proved()
            .authorize_supply_change()
            .label("token.burn")
            .child(
                AccountUpdate::builder(from)
                    .token_id(self.token_id)
                    .debit(amount)
                    .signed()
                    .bind_to_transaction()
                    .parents_own_token()
                    .label("token.burn.debit")
                    .build(),
            )
            .build()
    }

    /// Adopt a record built by another contract under this token's
    /// authority.
    ///
    /// The adopted record keeps whatever permission claims it was built
    /// with; adoption supplies the owner parent those claims chain up
    /// to. Required whenever a contract other than the token owner
    /// moves balance in this family.
    pub fn approve_update(&self, record: AccountUpdate) -> AccountUpdate {
        AccountUpdate::builder(self.owner)
            .proved()
            .label("token.approve")
            .child(record)
            .build()
    }

    /// Adopt several records at once under one owner parent.
    pub fn approve_updates(
        &self,
        records: impl IntoIterator<Item = AccountUpdate>,
    ) -> AccountUpdate {
        AccountUpdate::builder(self.owner)
            .proved()
            .label("token.approve")
            .children(records)
            .build()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Keypair;
    use crate::ledger::{
        Ledger, LedgerError, SignedTransaction, StateWord, Transaction, UpdateKind,
    };

    const FEE: u64 = 1_000;

    fn keyed() -> (Keypair, AccountId) {
        let kp = Keypair::generate();
        let id = AccountId::from_public_key(&kp.public_key());
        (kp, id)
    }

    /// Ledger with a funded fee payer, a registered token, and `holder`
    /// minted 1000 units.
    fn token_ledger() -> (Ledger, Keypair, AccountId, FungibleToken, Keypair, AccountId) {
        let mut ledger = Ledger::new();
        let (payer_kp, payer) = keyed();
        let (holder_kp, holder) = keyed();
        let (_, owner) = keyed();
        ledger.fund(payer, TokenId::NATIVE, 1_000_000);
        ledger.register_token(owner);
        let token = FungibleToken::new(owner);

        let tx = Transaction::builder(payer)
            .fee(FEE)
            .nonce(0)
            .update(token.mint(holder, 1_000))
            .build();
        let signed = SignedTransaction::new(tx).sign(&payer_kp);
        ledger.apply_transaction(&signed).unwrap();

        (ledger, payer_kp, payer, token, holder_kp, holder)
    }

    #[test]
    fn derived_token_id_matches_ledger_registration() {
        let mut ledger = Ledger::new();
        let (_, owner) = keyed();
        let registered = ledger.register_token(owner);
        assert_eq!(FungibleToken::new(owner).token_id(), registered);
    }

    #[test]
    fn mint_creates_supply() {
        let (ledger, _, _, token, _, holder) = token_ledger();
        assert_eq!(ledger.balance(&holder, &token.token_id()), 1_000);
    }

    #[test]
    fn transfer_moves_balance_with_holder_signature() {
        let (mut ledger, payer_kp, payer, token, holder_kp, holder) = token_ledger();
        let (_, receiver) = keyed();

        let tx = Transaction::builder(payer)
            .fee(FEE)
            .nonce(ledger.account_nonce(&payer))
            .update(token.transfer(holder, receiver, 250))
            .build();
        let signed = SignedTransaction::new(tx).sign(&payer_kp).sign(&holder_kp);
        ledger.apply_transaction(&signed).unwrap();

        assert_eq!(ledger.balance(&holder, &token.token_id()), 750);
        assert_eq!(ledger.balance(&receiver, &token.token_id()), 250);
    }

    #[test]
    fn transfer_without_holder_signature_is_rejected() {
        let (mut ledger, payer_kp, payer, token, _, holder) = token_ledger();
        let (_, receiver) = keyed();

        let tx = Transaction::builder(payer)
            .fee(FEE)
            .nonce(ledger.account_nonce(&payer))
            .update(token.transfer(holder, receiver, 250))
            .build();
        let signed = SignedTransaction::new(tx).sign(&payer_kp);

        match ledger.apply_transaction(&signed) {
            Err(LedgerError::MissingSignature { account, .. }) => assert_eq!(account, holder),
            other => panic!("expected MissingSignature, got {other:?}"),
        }
        assert_eq!(ledger.balance(&holder, &token.token_id()), 1_000);
    }

    #[test]
    fn transfer_overdraw_is_rejected() {
        let (mut ledger, payer_kp, payer, token, holder_kp, holder) = token_ledger();
        let (_, receiver) = keyed();

        let tx = Transaction::builder(payer)
            .fee(FEE)
            .nonce(ledger.account_nonce(&payer))
            .update(token.transfer(holder, receiver, 1_001))
            .build();
        let signed = SignedTransaction::new(tx).sign(&payer_kp).sign(&holder_kp);

        match ledger.apply_transaction(&signed) {
            Err(LedgerError::InsufficientBalance { available: 1_000, .. }) => {}
            other => panic!("expected InsufficientBalance, got {other:?}"),
        }
    }

    #[test]
    fn burn_retires_supply() {
        let (mut ledger, payer_kp, payer, token, holder_kp, holder) = token_ledger();

        let tx = Transaction::builder(payer)
            .fee(FEE)
            .nonce(ledger.account_nonce(&payer))
            .update(token.burn(holder, 400))
            .build();
        let signed = SignedTransaction::new(tx).sign(&payer_kp).sign(&holder_kp);
        ledger.apply_transaction(&signed).unwrap();

        assert_eq!(ledger.balance(&holder, &token.token_id()), 600);
    }

    #[test]
    fn bare_token_movement_without_owner_parent_is_rejected() {
        let (mut ledger, payer_kp, payer, token, holder_kp, holder) = token_ledger();
        let (_, receiver) = keyed();

        // Same debit/credit pair the transfer builds, minus the owner
        // record above them.
        let debit = AccountUpdate::builder(holder)
            .token_id(token.token_id())
            .debit(100)
            .signed()
            .parents_own_token()
            .child(
                AccountUpdate::builder(receiver)
                    .token_id(token.token_id())
                    .credit(100)
                    .inherit_token()
                    .build(),
            )
            .build();
        let tx = Transaction::builder(payer)
            .fee(FEE)
            .nonce(ledger.account_nonce(&payer))
            .update(debit)
            .build();
        let signed = SignedTransaction::new(tx).sign(&payer_kp).sign(&holder_kp);

        match ledger.apply_transaction(&signed) {
            Err(LedgerError::TokenPermissionDenied { .. }) => {}
            other => panic!("expected TokenPermissionDenied, got {other:?}"),
        }
    }

    #[test]
    fn approve_update_adopts_a_foreign_record() {
        let (mut ledger, payer_kp, payer, token, _, holder) = token_ledger();
        let (escrow_kp, escrow) = keyed();
        let (_, receiver) = keyed();

        // Stand-in for an escrow contract's own logic: release 100
        // units it holds, with a state write alongside.
        ledger.fund(escrow, token.token_id(), 100);
        let release = AccountUpdate::builder(escrow)
            .token_id(token.token_id())
            .debit(100)
            .signed()
            .bind_to_transaction()
            .parents_own_token()
            .write(0, StateWord::ZERO)
            .label("escrow.release")
            .child(
                AccountUpdate::builder(receiver)
                    .token_id(token.token_id())
                    .credit(100)
                    .inherit_token()
                    .build(),
            )
            .build();

        let tx = Transaction::builder(payer)
            .fee(FEE)
            .nonce(ledger.account_nonce(&payer))
            .update(token.approve_update(release))
            .build();
        let signed = SignedTransaction::new(tx).sign(&payer_kp).sign(&escrow_kp);
        ledger.apply_transaction(&signed).unwrap();

        assert_eq!(ledger.balance(&escrow, &token.token_id()), 0);
        assert_eq!(ledger.balance(&receiver, &token.token_id()), 100);
        // Holder untouched by the escrow flow.
        assert_eq!(ledger.balance(&holder, &token.token_id()), 1_000);
    }

    #[test]
    fn transfer_records_have_expected_shape() {
        let (_, owner) = keyed();
        let (_, from) = keyed();
        let (_, to) = keyed();
        let token = FungibleToken::new(owner);

        let root = token.transfer(from, to, 42);
        assert_eq!(root.account, owner);
        assert_eq!(root.kind, UpdateKind::Approval);
        assert_eq!(root.children.len(), 2);
        assert_eq!(root.children[0].kind, UpdateKind::Debit { amount: 42 });
        assert!(root.children[0].use_full_commitment);
        assert_eq!(root.children[1].kind, UpdateKind::Credit { amount: 42 });
        let net: i128 = root.balance_delta()
            + root.children.iter().map(|c| c.balance_delta()).sum::<i128>();
        assert_eq!(net, 0);
    }
}
