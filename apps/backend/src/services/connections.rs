//! Connection/Reconnection Manager.
//!
//! Maintains transport-session to participant-identity bindings per active
//! session and owns reconnection credentials. A credential is issued at
//! successful join, renewed on successful resume, and invalidated when its
//! session ends or the participant is removed.

use dashmap::DashMap;
use rand::prelude::*;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::domain::errors::DomainError;
use crate::domain::state::ParticipantId;

const CROCKFORD: &[u8] = b"0123456789ABCDEFGHJKMNPQRSTVWXYZ"; // no I, L, O, U
const TOKEN_LEN: usize = 16;

/// Opaque reconnection credential bound to (session, participant).
#[derive(Debug, Clone)]
pub struct Credential {
    pub token: String,
    pub session_id: Uuid,
    pub participant: ParticipantId,
    pub issued_at: OffsetDateTime,
    pub expires_at: OffsetDateTime,
    pub bound_conn: Option<Uuid>,
}

pub struct ConnectionManager {
    credentials: DashMap<String, Credential>,
    by_conn: DashMap<Uuid, String>,
    ttl: Duration,
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new(Duration::hours(1))
    }
}

impl ConnectionManager {
    pub fn new(ttl: Duration) -> Self {
        Self {
            credentials: DashMap::new(),
            by_conn: DashMap::new(),
            ttl,
        }
    }

    /// Issue a credential at successful join, bound to the joining
    /// transport.
    pub fn issue(
        &self,
        session_id: Uuid,
        participant: ParticipantId,
        conn_id: Uuid,
    ) -> Credential {
        let now = OffsetDateTime::now_utc();
        let credential = Credential {
            token: generate_token(),
            session_id,
            participant,
            issued_at: now,
            expires_at: now + self.ttl,
            bound_conn: Some(conn_id),
        };
        self.by_conn.insert(conn_id, credential.token.clone());
        self.credentials
            .insert(credential.token.clone(), credential.clone());
        credential
    }

    /// Resume with a credential on a fresh transport. Rejects a credential
    /// that is unknown, expired, or still bound to a different live
    /// transport. On success the credential is rebound and renewed.
    pub fn resume(&self, token: &str, conn_id: Uuid) -> Result<Credential, DomainError> {
        let mut entry = self
            .credentials
            .get_mut(token)
            .ok_or_else(|| DomainError::authorization("unknown reconnection credential"))?;

        let now = OffsetDateTime::now_utc();
        if now > entry.expires_at {
            return Err(DomainError::authorization("reconnection credential expired"));
        }
        if let Some(bound) = entry.bound_conn {
            if bound != conn_id {
                return Err(DomainError::authorization(
                    "credential is bound to another live transport",
                ));
            }
        }

        entry.bound_conn = Some(conn_id);
        entry.expires_at = now + self.ttl;
        self.by_conn.insert(conn_id, token.to_string());
        Ok(entry.clone())
    }

    /// Transport dropped: clear the binding, keep the credential valid for
    /// a later resume.
    pub fn release(&self, conn_id: Uuid) {
        if let Some((_, token)) = self.by_conn.remove(&conn_id) {
            if let Some(mut credential) = self.credentials.get_mut(&token) {
                if credential.bound_conn == Some(conn_id) {
                    credential.bound_conn = None;
                }
            }
        }
    }

    /// Invalidate every credential scoped to a session (session end or
    /// disposal).
    pub fn invalidate_session(&self, session_id: Uuid) {
        let tokens: Vec<String> = self
            .credentials
            .iter()
            .filter(|c| c.session_id == session_id)
            .map(|c| c.token.clone())
            .collect();
        for token in tokens {
            if let Some((_, credential)) = self.credentials.remove(&token) {
                if let Some(conn) = credential.bound_conn {
                    self.by_conn.remove(&conn);
                }
            }
        }
    }

    /// Invalidate the credential for one participant (explicit removal).
    pub fn invalidate_participant(&self, session_id: Uuid, participant: &str) {
        let tokens: Vec<String> = self
            .credentials
            .iter()
            .filter(|c| c.session_id == session_id && c.participant == participant)
            .map(|c| c.token.clone())
            .collect();
        for token in tokens {
            if let Some((_, credential)) = self.credentials.remove(&token) {
                if let Some(conn) = credential.bound_conn {
                    self.by_conn.remove(&conn);
                }
            }
        }
    }
}

fn generate_token() -> String {
    let mut rng = rand::rng();
    let mut s = String::with_capacity(TOKEN_LEN);
    for _ in 0..TOKEN_LEN {
        s.push(CROCKFORD[rng.random_range(0..CROCKFORD.len())] as char);
    }
    s
}
