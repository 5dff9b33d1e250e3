//! Money-request lifecycle.
//!
//! A request starts `pending` and leaves that state exactly once: `completed`
//! when accepted and paid, `cancelled` when declined, cancelled or accepted
//! past its due date. Listing marks overdue pending requests `expired`.

use tracing::{info, warn};

use super::{Engine, LedgerError, RequestError};
use crate::model::{
    Currency, MoneyRequest, NewMoneyRequest, RequestId, RequestStatus, Transaction,
    TransactionKind, TransactionStatus, UserId,
};

impl Engine {
    pub fn create_money_request(
        &mut self,
        user: &UserId,
        form: NewMoneyRequest,
    ) -> Result<MoneyRequest, LedgerError> {
        if !form.amount.is_positive() {
            return Err(RequestError::InvalidAmount(form.amount).into());
        }
        let now = self.now();
        if form.due_date < now {
            return Err(RequestError::DueDateInPast.into());
        }

        let request = MoneyRequest {
            id: Self::new_id(),
            payer: user.clone(),
            from_name: form.from_name,
            from_email: form.from_email,
            amount: form.amount,
            purpose: form.purpose,
            description: form.description,
            status: RequestStatus::Pending,
            due_date: form.due_date,
            created_at: now,
        };
        self.requests.insert(request.id.clone(), request.clone());
        info!(user = %user, request = %request.id, amount = %request.amount, "money request created");
        Ok(request)
    }

    /// Requests addressed to `user`, newest first.
    pub fn money_requests(&mut self, user: &UserId) -> Vec<MoneyRequest> {
        let now = self.now();
        let mut list: Vec<MoneyRequest> = self
            .requests
            .values_mut()
            .filter(|r| &r.payer == user)
            .map(|r| {
                if r.status == RequestStatus::Pending && r.due_date < now {
                    r.status = RequestStatus::Expired;
                }
                r.clone()
            })
            .collect();
        list.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        list
    }

    /// Pay a request:
    /// - Ensure it is addressed to `user` and still open
    /// - Cancel it instead when past due
    /// - Debit the USD balance and append a `sent` entry
    pub fn accept_money_request(
        &mut self,
        user: &UserId,
        id: &RequestId,
    ) -> Result<Transaction, LedgerError> {
        let result = self.apply_accept(user, id);
        Self::log_result("money request acceptance", user, None, &result);
        result
    }

    pub fn decline_money_request(
        &mut self,
        user: &UserId,
        id: &RequestId,
    ) -> Result<MoneyRequest, LedgerError> {
        let result = self.close_request(user, id);
        Self::log_result("money request decline", user, None, &result);
        result
    }

    pub fn cancel_money_request(
        &mut self,
        user: &UserId,
        id: &RequestId,
    ) -> Result<MoneyRequest, LedgerError> {
        let result = self.close_request(user, id);
        Self::log_result("money request cancellation", user, None, &result);
        result
    }
}

impl Engine {
    fn owned_request(&mut self, user: &UserId, id: &RequestId) -> Result<&mut MoneyRequest, RequestError> {
        self.requests
            .get_mut(id)
            .filter(|r| &r.payer == user)
            .ok_or_else(|| RequestError::NotFound(id.clone()))
    }

    fn apply_accept(&mut self, user: &UserId, id: &RequestId) -> Result<Transaction, LedgerError> {
        let now = self.now();
        let request = self.owned_request(user, id)?;

        let open = matches!(request.status, RequestStatus::Pending | RequestStatus::Expired);
        if !open {
            return Err(RequestError::NotPending(id.clone()).into());
        }
        if request.due_date < now || request.status == RequestStatus::Expired {
            request.status = RequestStatus::Cancelled;
            warn!(request = %id, due_date = %request.due_date, "request past due, cancelled");
            return Err(RequestError::Expired(id.clone()).into());
        }

        let request = request.clone();
        let usd = Currency::usd();
        self.wallet_mut(user)
            .try_debit(&usd, request.amount)
            .map_err(|shortfall| RequestError::InsufficientBalance {
                available: shortfall.available,
                required: shortfall.requested,
            })?;

        if let Some(stored) = self.requests.get_mut(id) {
            stored.status = RequestStatus::Completed;
        }

        let entry = Transaction {
            id: Self::new_id(),
            kind: TransactionKind::Sent,
            recipient_id: None,
            recipient_name: request.from_name.clone(),
            amount: request.amount,
            currency: usd,
            status: TransactionStatus::Completed,
            date: now,
            fee: None,
            exchange_rate: None,
            message: Some(request.purpose.clone()),
            reference_number: Some(self.reference_number()),
        };
        Ok(self.record(user, entry))
    }

    fn close_request(&mut self, user: &UserId, id: &RequestId) -> Result<MoneyRequest, LedgerError> {
        let request = self.owned_request(user, id)?;
        if request.status != RequestStatus::Pending {
            return Err(RequestError::NotPending(id.clone()).into());
        }
        request.status = RequestStatus::Cancelled;
        Ok(request.clone())
    }
}
