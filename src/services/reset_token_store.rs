use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;

/// 発行済みパスワードリセットトークンの情報
#[derive(Clone, Debug)]
pub struct ResetTokenEntry {
    pub email: String,
    pub expires_at: DateTime<Utc>,
}

/// リセットトークン（jti）のインメモリストア。各トークンは一度だけ使用できる。
#[derive(Clone, Default)]
pub struct ResetTokenStore {
    // jti -> ResetTokenEntry
    tokens: Arc<DashMap<String, ResetTokenEntry>>,
}

impl ResetTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 5分ごとに期限切れトークンを削除するタスクを起動する
    pub fn spawn_cleanup(&self) -> tokio::task::JoinHandle<()> {
        let tokens = self.tokens.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(300));
            loop {
                interval.tick().await;
                let removed = Self::cleanup_expired(&tokens);
                if removed > 0 {
                    tracing::debug!(removed, "expired reset tokens removed");
                }
            }
        })
    }

    pub fn store(&self, jti: String, email: String, expires_at: DateTime<Utc>) {
        self.tokens.insert(jti, ResetTokenEntry { email, expires_at });
    }

    /// トークンを消費する。未登録・使用済み・期限切れ・メール不一致はすべて `false`。
    pub fn consume(&self, jti: &str, email: &str) -> bool {
        // remove で取り出すので同じトークンの並行使用は一方のみ成功する
        match self.tokens.remove(jti) {
            Some((_, entry)) => entry.expires_at > Utc::now() && entry.email == email,
            None => false,
        }
    }

    /// 同じアドレス宛の未使用トークンをすべて無効化
    pub fn invalidate_for(&self, email: &str) {
        self.tokens.retain(|_, entry| entry.email != email);
    }

    fn cleanup_expired(tokens: &DashMap<String, ResetTokenEntry>) -> usize {
        let now = Utc::now();
        let before = tokens.len();
        tokens.retain(|_, entry| entry.expires_at > now);
        before - tokens.len()
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn token_can_be_consumed_once() {
        let store = ResetTokenStore::new();
        store.store(
            "jti-1".into(),
            "anna@example.com".into(),
            Utc::now() + Duration::minutes(30),
        );

        assert!(store.consume("jti-1", "anna@example.com"));
        assert!(!store.consume("jti-1", "anna@example.com"));
    }

    #[test]
    fn expired_or_mismatched_tokens_are_rejected() {
        let store = ResetTokenStore::new();
        store.store(
            "old".into(),
            "anna@example.com".into(),
            Utc::now() - Duration::minutes(1),
        );
        store.store(
            "other".into(),
            "anna@example.com".into(),
            Utc::now() + Duration::minutes(30),
        );

        assert!(!store.consume("old", "anna@example.com"));
        assert!(!store.consume("other", "piotr@example.com"));
        assert!(store.is_empty());
    }

    #[test]
    fn cleanup_keeps_live_tokens() {
        let store = ResetTokenStore::new();
        store.store("a".into(), "x@example.com".into(), Utc::now() - Duration::seconds(1));
        store.store("b".into(), "x@example.com".into(), Utc::now() + Duration::minutes(5));

        assert_eq!(ResetTokenStore::cleanup_expired(&store.tokens), 1);
        assert_eq!(store.len(), 1);

        store.invalidate_for("x@example.com");
        assert!(store.is_empty());
    }
}
