//! Saved code snippets, per user.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::ServiceError;

/// A stored snippet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedCode {
    pub id: String,
    pub user_email: String,
    pub code_name: String,
    pub code: String,
    pub language: String,
    /// Milliseconds since the Unix epoch.
    pub created_at: u64,
}

/// A save request as the editor sends it. Every field is required.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSnippet {
    pub user_email: Option<String>,
    pub code_name: Option<String>,
    pub code: Option<String>,
    pub language: Option<String>,
}

impl NewSnippet {
    pub fn new(
        user_email: impl Into<String>,
        code_name: impl Into<String>,
        code: impl Into<String>,
        language: impl Into<String>,
    ) -> Self {
        Self {
            user_email: Some(user_email.into()),
            code_name: Some(code_name.into()),
            code: Some(code.into()),
            language: Some(language.into()),
        }
    }
}

/// Snippet persistence.
pub trait SnippetStore: Send + Sync + 'static {
    /// Stores a snippet and returns it with its id.
    fn save(
        &self,
        snippet: NewSnippet,
    ) -> impl Future<Output = Result<SavedCode, ServiceError>> + Send;

    /// Every snippet of `user_email`.
    fn list(
        &self,
        user_email: &str,
    ) -> impl Future<Output = Result<Vec<SavedCode>, ServiceError>> + Send;

    fn delete(&self, id: &str) -> impl Future<Output = Result<(), ServiceError>> + Send;
}

/// A [`SnippetStore`] held in memory.
#[derive(Debug, Default)]
pub struct InMemorySnippetStore {
    snippets: Mutex<Vec<SavedCode>>,
    next_id: AtomicU64,
}

impl InMemorySnippetStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.snippets.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.snippets.lock().await.is_empty()
    }

    fn generate_id(&self) -> String {
        let n = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        format!("{n:024x}")
    }
}

impl SnippetStore for InMemorySnippetStore {
    async fn save(&self, snippet: NewSnippet) -> Result<SavedCode, ServiceError> {
        let NewSnippet {
            user_email: Some(user_email),
            code_name: Some(code_name),
            code: Some(code),
            language: Some(language),
        } = snippet
        else {
            return Err(ServiceError::MissingFields);
        };
        let user_email = user_email.trim().to_string();
        let code_name = code_name.trim().to_string();

        let mut snippets = self.snippets.lock().await;
        if snippets
            .iter()
            .any(|s| s.user_email == user_email && s.code_name == code_name)
        {
            return Err(ServiceError::Duplicate {
                email: user_email,
                name: code_name,
            });
        }

        let saved = SavedCode {
            id: self.generate_id(),
            user_email,
            code_name,
            code: code.trim().to_string(),
            language: language.trim().to_string(),
            created_at: now_millis(),
        };
        tracing::info!(id = %saved.id, user = %saved.user_email, name = %saved.code_name, "snippet saved");
        snippets.push(saved.clone());
        Ok(saved)
    }

    async fn list(&self, user_email: &str) -> Result<Vec<SavedCode>, ServiceError> {
        let user_email = user_email.trim();
        if user_email.is_empty() {
            return Err(ServiceError::Invalid("user email"));
        }
        let found: Vec<_> = self
            .snippets
            .lock()
            .await
            .iter()
            .filter(|s| s.user_email == user_email)
            .cloned()
            .collect();
        tracing::debug!(user = %user_email, count = found.len(), "snippets listed");
        Ok(found)
    }

    async fn delete(&self, id: &str) -> Result<(), ServiceError> {
        let id = id.trim();
        if id.is_empty() {
            return Err(ServiceError::Invalid("code id"));
        }
        let mut snippets = self.snippets.lock().await;
        let pos = snippets
            .iter()
            .position(|s| s.id == id)
            .ok_or_else(|| ServiceError::NotFound(id.to_string()))?;
        snippets.remove(pos);
        tracing::info!(%id, "snippet deleted");
        Ok(())
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_save_trims_fields() {
        let store = InMemorySnippetStore::new();
        let saved = store
            .save(NewSnippet::new(" ada@example.com ", " fib ", "  fn fib() {}\n", " python "))
            .await
            .unwrap();

        assert_eq!(saved.user_email, "ada@example.com");
        assert_eq!(saved.code_name, "fib");
        assert_eq!(saved.code, "fn fib() {}");
        assert_eq!(saved.language, "python");
        assert_eq!(saved.id.len(), 24);
    }

    #[tokio::test]
    async fn test_save_missing_field_is_rejected() {
        let store = InMemorySnippetStore::new();
        let snippet = NewSnippet {
            code: None,
            ..NewSnippet::new("ada@example.com", "fib", "x", "python")
        };

        let result = store.save(snippet).await;

        assert!(matches!(result, Err(ServiceError::MissingFields)));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_save_duplicate_name_for_same_user_is_rejected() {
        let store = InMemorySnippetStore::new();
        store
            .save(NewSnippet::new("ada@example.com", "fib", "a", "python"))
            .await
            .unwrap();

        let result = store
            .save(NewSnippet::new("ada@example.com", " fib", "b", "java"))
            .await;

        assert!(matches!(result, Err(ServiceError::Duplicate { .. })));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_save_same_name_for_other_user_is_allowed() {
        let store = InMemorySnippetStore::new();
        store
            .save(NewSnippet::new("ada@example.com", "fib", "a", "python"))
            .await
            .unwrap();
        store
            .save(NewSnippet::new("bob@example.com", "fib", "b", "python"))
            .await
            .unwrap();
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn test_list_returns_only_that_users_snippets() {
        let store = InMemorySnippetStore::new();
        store
            .save(NewSnippet::new("ada@example.com", "one", "a", "c"))
            .await
            .unwrap();
        store
            .save(NewSnippet::new("bob@example.com", "two", "b", "c"))
            .await
            .unwrap();

        let listed = store.list(" ada@example.com").await.unwrap();

        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].code_name, "one");
    }

    #[tokio::test]
    async fn test_list_blank_email_is_invalid() {
        let store = InMemorySnippetStore::new();
        assert!(matches!(
            store.list("  ").await,
            Err(ServiceError::Invalid("user email"))
        ));
    }

    #[tokio::test]
    async fn test_delete_removes_snippet() {
        let store = InMemorySnippetStore::new();
        let saved = store
            .save(NewSnippet::new("ada@example.com", "fib", "a", "python"))
            .await
            .unwrap();

        store.delete(&saved.id).await.unwrap();

        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_delete_unknown_id_is_not_found() {
        let store = InMemorySnippetStore::new();
        assert!(matches!(
            store.delete("ffff").await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[test]
    fn test_saved_code_serializes_camel_case() {
        let saved = SavedCode {
            id: "1".into(),
            user_email: "ada@example.com".into(),
            code_name: "fib".into(),
            code: "x".into(),
            language: "python".into(),
            created_at: 0,
        };
        let json = serde_json::to_value(&saved).unwrap();
        assert_eq!(json["userEmail"], "ada@example.com");
        assert_eq!(json["codeName"], "fib");
        assert_eq!(json["createdAt"], 0);
    }
}
