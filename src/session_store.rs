//! Persistence boundary (§6 Persisted state). The single seam to the
//! out-of-scope historical-session store; grounded on the teacher's
//! `repo/mod.rs` trait-first repository pattern.

use crate::domain::Session;
use async_trait::async_trait;
use parking_lot::Mutex;

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn append(&self, session: Session) -> anyhow::Result<()>;
    async fn flush_open(&self, sessions: Vec<Session>) -> anyhow::Result<()>;
}

/// Default in-memory implementation, suitable for the single-process
/// default and for tests. A SQL-backed implementation is an external
/// collaborator, out of scope per §1.
#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: Mutex<Vec<Session>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> Vec<Session> {
        self.sessions.lock().clone()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn append(&self, session: Session) -> anyhow::Result<()> {
        self.sessions.lock().push(session);
        Ok(())
    }

    async fn flush_open(&self, sessions: Vec<Session>) -> anyhow::Result<()> {
        self.sessions.lock().extend(sessions);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn append_and_flush_accumulate() {
        let store = InMemorySessionStore::new();
        let s1 = Session::open("lp1".into(), Utc::now(), None, None);
        store.append(s1).await.unwrap();

        let s2 = Session::open("lp2".into(), Utc::now(), None, None);
        store.flush_open(vec![s2]).await.unwrap();

        assert_eq!(store.all().len(), 2);
    }
}
