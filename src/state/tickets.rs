use std::time::Duration;

use dashmap::DashMap;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::state::{channel::ConnectionRole, session::SubjectKey, sport::SportKind};

/// Single-use credential that admits one push connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    /// Opaque token presented in the stream URL.
    pub token: String,
    pub key: SubjectKey,
    pub sport: SportKind,
    pub role: ConnectionRole,
    /// Identity of the caller the ticket was issued to.
    pub issued_to: String,
    pub expires_at: OffsetDateTime,
}

/// Reasons a ticket redemption fails.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TicketError {
    #[error("ticket is unknown or was already used")]
    Unknown,
    #[error("ticket expired")]
    Expired,
    #[error("ticket was issued for another live session")]
    Mismatch,
}

/// Outstanding connection tickets.
pub struct TicketBook {
    tickets: DashMap<String, Ticket>,
    ttl: Duration,
}

impl TicketBook {
    pub fn new(ttl: Duration) -> Self {
        Self {
            tickets: DashMap::new(),
            ttl,
        }
    }

    /// Issue a fresh ticket valid for the configured TTL.
    pub fn issue(
        &self,
        key: SubjectKey,
        sport: SportKind,
        role: ConnectionRole,
        issued_to: &str,
    ) -> Ticket {
        let ticket = Ticket {
            token: Uuid::new_v4().simple().to_string(),
            key,
            sport,
            role,
            issued_to: issued_to.to_string(),
            expires_at: OffsetDateTime::now_utc() + self.ttl,
        };
        self.tickets.insert(ticket.token.clone(), ticket.clone());
        ticket
    }

    /// Consume a ticket for the given subject. A ticket is removed on the first attempt,
    /// whatever the outcome.
    pub fn redeem(
        &self,
        token: &str,
        sport: SportKind,
        key: SubjectKey,
    ) -> Result<Ticket, TicketError> {
        self.redeem_at(token, sport, key, OffsetDateTime::now_utc())
    }

    fn redeem_at(
        &self,
        token: &str,
        sport: SportKind,
        key: SubjectKey,
        now: OffsetDateTime,
    ) -> Result<Ticket, TicketError> {
        let (_, ticket) = self.tickets.remove(token).ok_or(TicketError::Unknown)?;
        if ticket.expires_at <= now {
            return Err(TicketError::Expired);
        }
        if ticket.sport != sport || ticket.key != key {
            return Err(TicketError::Mismatch);
        }
        Ok(ticket)
    }

    /// Drop expired tickets, returning how many were removed.
    pub fn prune_expired(&self) -> usize {
        self.prune_expired_at(OffsetDateTime::now_utc())
    }

    fn prune_expired_at(&self, now: OffsetDateTime) -> usize {
        let before = self.tickets.len();
        self.tickets.retain(|_, ticket| ticket.expires_at > now);
        before - self.tickets.len()
    }

    /// Number of outstanding tickets.
    pub fn len(&self) -> usize {
        self.tickets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tickets.is_empty()
    }
}
