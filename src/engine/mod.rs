//! Document versioning engine.
//!
//! All page writes go through [`DocumentEngine`]. Every save snapshots the
//! article it replaces into the page history. The new article and the
//! snapshot are written in one store statement, conditioned on the replaced
//! article still being current, so the history never lags behind the article.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;

use crate::codec::Codec;
use crate::db::{DocStore, Field, PageUpdate, Predicate, Projection, Sort};
use crate::errors::AppError;
use crate::models::{Article, DocId, History, HistoryEntry, NewPage, Page, User};
use crate::query;

/// What happened to a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageEvent {
    Created,
    Updated,
}

/// Receives page events after the write has been persisted.
///
/// Observers run on their own task and are never awaited by the writer;
/// errors they return are logged and otherwise ignored.
#[async_trait]
pub trait PageObserver: Send + Sync {
    async fn notify(&self, event: PageEvent, page: &Page) -> Result<(), AppError>;
}

/// Re-reads allowed for one save before giving up under contention.
const MAX_SAVE_ATTEMPTS: usize = 32;

pub struct DocumentEngine {
    store: DocStore,
    codec: Arc<dyn Codec>,
    observers: Vec<Arc<dyn PageObserver>>,
    /// Reject saves based on an outdated article instead of overwriting
    strict_save: bool,
}

impl DocumentEngine {
    pub fn new(
        store: DocStore,
        codec: Arc<dyn Codec>,
        observers: Vec<Arc<dyn PageObserver>>,
        strict_save: bool,
    ) -> Self {
        Self {
            store,
            codec,
            observers,
            strict_save,
        }
    }

    pub fn store(&self) -> &DocStore {
        &self.store
    }

    /// Create a page authored by `author` with an empty history.
    pub async fn create_page(&self, author: &User, new_page: NewPage) -> Result<Page, AppError> {
        let page = Page {
            id: DocId::new(),
            author_id: author.id,
            article: Article {
                id: DocId::new(),
                title: new_page.title,
                body: new_page.body,
                editor_user_id: author.id,
                edited_at: Utc::now(),
            },
            history: Vec::new(),
            projects: new_page.projects,
            access: new_page.access,
            groups: new_page.groups,
        };

        self.store.insert_page(&page).await?;
        tracing::info!("Page {} created by {}", page.id, author.name);

        self.dispatch(PageEvent::Created, &page);
        Ok(page)
    }

    /// Fetch a page with its history. Malformed ids are reported as missing.
    pub async fn load_page(&self, id: &str) -> Result<Page, AppError> {
        let id: DocId = id
            .parse()
            .map_err(|_| AppError::NotFound(format!("Page {} not found", id)))?;

        self.store
            .find_page(id, Projection::Full)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Page {} not found", id)))
    }

    /// Persist an edit of `page` made by `editor`.
    ///
    /// The caller must have checked that `editor` holds EDITOR. On success
    /// `page` carries the new article id, the editor stamp and the full
    /// history including the snapshot of the replaced article.
    ///
    /// Each write is conditioned on the article it snapshots. A write that
    /// loses a race re-reads the page and snapshots the article that won; in
    /// strict mode it fails with `Conflict` instead.
    pub async fn save_page(&self, page: &mut Page, editor: &User) -> Result<(), AppError> {
        let base_article_id = page.article.id;
        page.article.id = DocId::new();
        page.article.editor_user_id = editor.id;
        page.article.edited_at = Utc::now();

        for attempt in 1..=MAX_SAVE_ATTEMPTS {
            let persisted = self
                .store
                .find_page(page.id, Projection::Full)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("Page {} not found", page.id)))?;

            if self.strict_save && persisted.article.id != base_article_id {
                return Err(AppError::Conflict(format!(
                    "Page {} was edited by someone else",
                    page.id
                )));
            }

            let entry = self.snapshot(&persisted.article);
            let changed = self
                .store
                .update_page(
                    page.id,
                    &PageUpdate::of(page),
                    Some(&entry),
                    Some(persisted.article.id),
                )
                .await?;

            if changed == 0 {
                tracing::debug!("Save of page {} raced another edit (attempt {})", page.id, attempt);
                continue;
            }

            page.author_id = persisted.author_id;
            page.history = persisted.history;
            page.history.push(entry);

            tracing::info!(
                "Page {} saved by {} (revision {})",
                page.id,
                editor.name,
                page.history.len()
            );

            self.dispatch(PageEvent::Updated, page);
            return Ok(());
        }

        tracing::warn!("Giving up on page {} after {} contended saves", page.id, MAX_SAVE_ATTEMPTS);
        Err(AppError::Conflict(format!(
            "Page {} is being edited too often, try again",
            page.id
        )))
    }

    /// Pages `user` may see, optionally narrowed by search terms, newest first.
    pub async fn list_visible_pages(
        &self,
        user: &User,
        search: Option<&str>,
    ) -> Result<Vec<Page>, AppError> {
        let filter = query::compose(&self.store, user, search).await?;
        self.store
            .find_pages(&filter, Projection::WithoutHistory, Sort::EditedAtDesc)
            .await
    }

    /// Pages authored by `user`, newest first.
    pub async fn list_own_pages(&self, user: &User) -> Result<Vec<Page>, AppError> {
        self.store
            .find_pages(
                &Predicate::eq(Field::Author, user.id),
                Projection::WithoutHistory,
                Sort::EditedAtDesc,
            )
            .await
    }

    /// Decompress the history of a page, oldest first.
    pub fn page_history(&self, page: &Page) -> Result<Vec<HistoryEntry>, AppError> {
        page.history
            .iter()
            .map(|entry| -> Result<HistoryEntry, AppError> {
                Ok(HistoryEntry {
                    id: entry.id,
                    title: self.codec.decode(&entry.compressed_title)?,
                    body: self.codec.decode(&entry.compressed_body)?,
                    editor_user_id: entry.editor_user_id,
                    edited_at: entry.edited_at,
                })
            })
            .collect()
    }

    /// Ids of the groups granting `user` visibility.
    pub async fn visible_group_ids(&self, user: &User) -> Result<Vec<DocId>, AppError> {
        query::visible_group_ids(&self.store, user).await
    }

    fn snapshot(&self, article: &Article) -> History {
        History {
            id: article.id,
            compressed_title: self.codec.encode(&article.title),
            compressed_body: self.codec.encode(&article.body),
            editor_user_id: article.editor_user_id,
            edited_at: article.edited_at,
        }
    }

    fn dispatch(&self, event: PageEvent, page: &Page) {
        for observer in &self.observers {
            let observer = Arc::clone(observer);
            let page = page.clone();
            tokio::spawn(async move {
                if let Err(e) = observer.notify(event, &page).await {
                    tracing::warn!("Page observer failed for {}: {}", page.id, e);
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Lz4Codec;
    use crate::db::{init_database, Transaction};
    use crate::models::{AccessLevel, Group, Permission};
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::sync::mpsc;

    async fn setup_with(
        observers: Vec<Arc<dyn PageObserver>>,
        strict_save: bool,
    ) -> (DocumentEngine, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let pool = init_database(&temp_dir.path().join("engine.sqlite"))
            .await
            .unwrap();
        let engine = DocumentEngine::new(
            DocStore::new(pool),
            Arc::new(Lz4Codec),
            observers,
            strict_save,
        );
        (engine, temp_dir)
    }

    async fn setup() -> (DocumentEngine, TempDir) {
        setup_with(Vec::new(), false).await
    }

    fn user(name: &str, permissions: &[Permission]) -> User {
        User {
            id: DocId::new(),
            name: name.to_string(),
            email: format!("{name}@example.com"),
            password_hash: String::new(),
            permissions: permissions.iter().copied().collect(),
            disabled: false,
        }
    }

    fn titled(title: &str, body: &str, access: AccessLevel) -> NewPage {
        NewPage {
            title: title.to_string(),
            body: body.to_string(),
            access,
            ..Default::default()
        }
    }

    async fn add_group(engine: &DocumentEngine, members: Vec<DocId>) -> DocId {
        let group = Group {
            id: DocId::new(),
            name: format!("group-{}", DocId::new()),
            members,
        };
        Transaction::begin(engine.store().pool())
            .await
            .unwrap()
            .insert(&[group.clone()])
            .await
            .commit()
            .await
            .unwrap();
        group.id
    }

    fn titles(pages: &[Page]) -> Vec<&str> {
        pages.iter().map(|p| p.article.title.as_str()).collect()
    }

    #[tokio::test]
    async fn test_create_defaults_to_private_with_empty_history() {
        let (engine, _dir) = setup().await;
        let author = user("alice", &[Permission::Editor]);

        let page = engine.create_page(&author, NewPage::default()).await.unwrap();
        assert_eq!(page.access, AccessLevel::Private);
        assert_eq!(page.author_id, author.id);
        assert_eq!(page.article.editor_user_id, author.id);

        let loaded = engine.load_page(&page.id.to_string()).await.unwrap();
        assert!(loaded.history.is_empty());
        assert_eq!(loaded.access, AccessLevel::Private);
    }

    #[tokio::test]
    async fn test_load_rejects_malformed_and_missing_ids() {
        let (engine, _dir) = setup().await;

        let err = engine.load_page("not-a-page-id").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        let err = engine.load_page(&DocId::new().to_string()).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_history_snapshots_replaced_article() {
        let (engine, _dir) = setup().await;
        let alice = user("alice", &[Permission::Editor]);
        let bob = user("bob", &[Permission::Editor]);

        let mut page = engine
            .create_page(&alice, titled("v0", "body 0", AccessLevel::Public))
            .await
            .unwrap();
        let first_article = page.article.clone();

        for (i, editor) in [&bob, &alice, &bob].into_iter().enumerate() {
            page.article.title = format!("v{}", i + 1);
            page.article.body = format!("body {}", i + 1);
            let before = page.article.id;
            engine.save_page(&mut page, editor).await.unwrap();
            assert_ne!(page.article.id, before);
            assert_eq!(page.article.editor_user_id, editor.id);
        }

        let loaded = engine.load_page(&page.id.to_string()).await.unwrap();
        assert_eq!(loaded.history.len(), 3);
        assert_eq!(loaded.article.title, "v3");
        assert_eq!(loaded.article.id, page.article.id);
        assert_eq!(loaded.history, page.history);
        assert!(loaded
            .history
            .windows(2)
            .all(|w| w[0].edited_at <= w[1].edited_at));

        let history = engine.page_history(&loaded).unwrap();
        let restored: Vec<(&str, &str)> = history
            .iter()
            .map(|h| (h.title.as_str(), h.body.as_str()))
            .collect();
        assert_eq!(
            restored,
            vec![("v0", "body 0"), ("v1", "body 1"), ("v2", "body 2")]
        );

        // The first entry is the original article, stamped by its author
        assert_eq!(history[0].id, first_article.id);
        assert_eq!(history[0].editor_user_id, alice.id);
        assert_eq!(history[0].edited_at, first_article.edited_at);
        assert_eq!(history[1].editor_user_id, bob.id);
    }

    #[tokio::test]
    async fn test_save_of_missing_page_fails() {
        let (engine, _dir) = setup().await;
        let alice = user("alice", &[Permission::Editor]);
        let mut page = engine.create_page(&alice, NewPage::default()).await.unwrap();
        page.id = DocId::new();

        let err = engine.save_page(&mut page, &alice).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_private_to_public_scenario() {
        let (engine, _dir) = setup().await;
        let a = user("author", &[Permission::Editor]);
        let b = user("bystander", &[Permission::Editor]);
        let admin = user("admin", &[Permission::Admin, Permission::Editor]);

        let mut page = engine
            .create_page(&a, titled("X", "", AccessLevel::default()))
            .await
            .unwrap();
        assert!(page.history.is_empty());

        page.article.title = "Y".into();
        engine.save_page(&mut page, &a).await.unwrap();
        assert_eq!(page.history.len(), 1);
        assert_eq!(page.history[0].editor_user_id, a.id);
        assert_eq!(page.article.title, "Y");

        assert!(engine.list_visible_pages(&b, None).await.unwrap().is_empty());
        assert_eq!(titles(&engine.list_visible_pages(&a, None).await.unwrap()), vec!["Y"]);

        let mut page = engine.load_page(&page.id.to_string()).await.unwrap();
        page.access = AccessLevel::Public;
        engine.save_page(&mut page, &admin).await.unwrap();

        assert_eq!(titles(&engine.list_visible_pages(&b, None).await.unwrap()), vec!["Y"]);
        assert_eq!(page.history.len(), 2);
    }

    #[tokio::test]
    async fn test_group_visibility() {
        let (engine, _dir) = setup().await;
        let author = user("author", &[Permission::Editor]);
        let member = user("member", &[]);
        let outsider = user("outsider", &[]);
        let admin = user("admin", &[Permission::Admin]);

        let group = add_group(&engine, vec![member.id]).await;
        let mut shared = titled("shared", "", AccessLevel::Group);
        shared.groups = vec![group];
        engine.create_page(&author, shared).await.unwrap();

        // Group ids on a private page grant nothing
        let mut private = titled("private", "", AccessLevel::Private);
        private.groups = vec![group];
        engine.create_page(&author, private).await.unwrap();

        assert_eq!(titles(&engine.list_visible_pages(&member, None).await.unwrap()), vec!["shared"]);
        assert!(engine.list_visible_pages(&outsider, None).await.unwrap().is_empty());
        assert_eq!(titles(&engine.list_visible_pages(&admin, None).await.unwrap()), vec!["shared"]);
        assert_eq!(engine.list_visible_pages(&author, None).await.unwrap().len(), 2);

        assert_eq!(engine.visible_group_ids(&member).await.unwrap(), vec![group]);
        assert!(engine.visible_group_ids(&outsider).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_admin_listing_with_many_groups() {
        let (engine, _dir) = setup().await;
        let author = user("author", &[Permission::Editor]);
        let admin = user("admin", &[Permission::Admin]);

        let group = add_group(&engine, Vec::new()).await;
        let mut shared = titled("shared", "", AccessLevel::Group);
        shared.groups = vec![group];
        engine.create_page(&author, shared).await.unwrap();

        // A deleted group grants nothing, admin or not
        let mut orphaned = titled("orphaned", "", AccessLevel::Group);
        orphaned.groups = vec![DocId::new()];
        engine.create_page(&author, orphaned).await.unwrap();

        // More groups than SQLite accepts bind parameters
        sqlx::query(
            r#"WITH RECURSIVE n(i) AS (SELECT 1 UNION ALL SELECT i + 1 FROM n WHERE i < 33000)
               INSERT INTO "groups" (id, name, members)
               SELECT printf('bulk-%d', i), printf('bulk-%d', i), '[]' FROM n"#,
        )
        .execute(engine.store().pool())
        .await
        .unwrap();

        let listed = engine.list_visible_pages(&admin, None).await.unwrap();
        assert_eq!(titles(&listed), vec!["shared"]);
    }

    #[tokio::test]
    async fn test_search_requires_every_term() {
        let (engine, _dir) = setup().await;
        let author = user("author", &[Permission::Editor]);
        let reader = user("reader", &[]);

        for (title, body) in [
            ("alpha", "beta inside"),
            ("alpha only", "nothing else"),
            ("beta first", "then alpha"),
            ("neither", "none"),
        ] {
            engine
                .create_page(&author, titled(title, body, AccessLevel::Public))
                .await
                .unwrap();
        }
        engine
            .create_page(&author, titled("alpha beta", "", AccessLevel::Private))
            .await
            .unwrap();

        let mut hits = titles(
            &engine
                .list_visible_pages(&reader, Some("alpha beta"))
                .await
                .unwrap(),
        )
        .into_iter()
        .map(String::from)
        .collect::<Vec<_>>();
        hits.sort();
        assert_eq!(hits, vec!["alpha", "beta first"]);

        let all = engine.list_visible_pages(&reader, Some("   ")).await.unwrap();
        assert_eq!(all.len(), 4);
        assert!(all.iter().all(|p| p.history.is_empty()));
    }

    #[tokio::test]
    async fn test_listing_is_newest_first() {
        let (engine, _dir) = setup().await;
        let author = user("author", &[Permission::Editor]);

        let mut first = engine
            .create_page(&author, titled("first", "", AccessLevel::Public))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        engine
            .create_page(&author, titled("second", "", AccessLevel::Public))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        engine.save_page(&mut first, &author).await.unwrap();

        let own = engine.list_own_pages(&author).await.unwrap();
        assert_eq!(titles(&own), vec!["first", "second"]);
        assert!(engine
            .list_own_pages(&user("nobody", &[]))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_last_write_wins_by_default() {
        let (engine, _dir) = setup().await;
        let alice = user("alice", &[Permission::Editor]);
        let page = engine.create_page(&alice, NewPage::default()).await.unwrap();

        let mut first = page.clone();
        let mut second = page.clone();
        first.article.title = "first".into();
        second.article.title = "second".into();
        engine.save_page(&mut first, &alice).await.unwrap();
        engine.save_page(&mut second, &alice).await.unwrap();

        let loaded = engine.load_page(&page.id.to_string()).await.unwrap();
        assert_eq!(loaded.article.title, "second");
        assert_eq!(loaded.history.len(), 2);
    }

    #[tokio::test]
    async fn test_strict_save_rejects_stale_edit() {
        let (engine, _dir) = setup_with(Vec::new(), true).await;
        let alice = user("alice", &[Permission::Editor]);
        let page = engine.create_page(&alice, NewPage::default()).await.unwrap();

        let mut first = page.clone();
        let mut stale = page.clone();
        first.article.title = "first".into();
        stale.article.title = "stale".into();
        engine.save_page(&mut first, &alice).await.unwrap();

        let err = engine.save_page(&mut stale, &alice).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        let loaded = engine.load_page(&page.id.to_string()).await.unwrap();
        assert_eq!(loaded.article.title, "first");
        assert_eq!(loaded.history.len(), 1);

        // Based on the current article, the edit goes through
        first.article.title = "second".into();
        engine.save_page(&mut first, &alice).await.unwrap();
    }

    /// Start `writers` saves from the same loaded page at once and collect
    /// the article id each successful save wrote.
    async fn race_saves(
        engine: &Arc<DocumentEngine>,
        base: &Page,
        writers: usize,
    ) -> Vec<Result<DocId, AppError>> {
        let editor = user("racer", &[Permission::Editor]);
        let tasks: Vec<_> = (0..writers)
            .map(|i| {
                let engine = Arc::clone(engine);
                let editor = editor.clone();
                let mut page = base.clone();
                page.article.title = format!("t{i}");
                tokio::spawn(async move {
                    engine
                        .save_page(&mut page, &editor)
                        .await
                        .map(|()| page.article.id)
                })
            })
            .collect();

        let mut results = Vec::with_capacity(writers);
        for task in tasks {
            results.push(task.await.unwrap());
        }
        results
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_saves_keep_every_replaced_article() {
        let (engine, _dir) = setup().await;
        let engine = Arc::new(engine);
        let alice = user("alice", &[Permission::Editor]);
        let page = engine.create_page(&alice, NewPage::default()).await.unwrap();

        let written: Vec<DocId> = race_saves(&engine, &page, 8)
            .await
            .into_iter()
            .map(|result| result.unwrap())
            .collect();

        let loaded = engine.load_page(&page.id.to_string()).await.unwrap();
        assert!(written.contains(&loaded.article.id));
        assert_eq!(loaded.history.len(), 8);
        assert_eq!(loaded.history[0].id, page.article.id);

        // Every stored article except the current one appears exactly once
        let mut expected: Vec<DocId> = written
            .iter()
            .copied()
            .chain([page.article.id])
            .filter(|id| *id != loaded.article.id)
            .collect();
        let mut recorded: Vec<DocId> = loaded.history.iter().map(|h| h.id).collect();
        expected.sort();
        recorded.sort();
        assert_eq!(recorded, expected);

        recorded.dedup();
        assert_eq!(recorded.len(), loaded.history.len());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_strict_saves_admit_one_writer() {
        let (engine, _dir) = setup_with(Vec::new(), true).await;
        let engine = Arc::new(engine);
        let alice = user("alice", &[Permission::Editor]);
        let page = engine.create_page(&alice, NewPage::default()).await.unwrap();

        let results = race_saves(&engine, &page, 8).await;
        let winners: Vec<DocId> = results
            .iter()
            .filter_map(|result| result.as_ref().ok().copied())
            .collect();
        assert_eq!(winners.len(), 1);
        assert!(results
            .iter()
            .filter_map(|result| result.as_ref().err())
            .all(|err| matches!(err, AppError::Conflict(_))));

        let loaded = engine.load_page(&page.id.to_string()).await.unwrap();
        assert_eq!(loaded.article.id, winners[0]);
        assert_eq!(loaded.history.len(), 1);
        assert_eq!(loaded.history[0].id, page.article.id);
    }

    struct Recorder {
        events: mpsc::UnboundedSender<(PageEvent, DocId)>,
    }

    #[async_trait]
    impl PageObserver for Recorder {
        async fn notify(&self, event: PageEvent, page: &Page) -> Result<(), AppError> {
            self.events.send((event, page.id)).ok();
            Ok(())
        }
    }

    struct Failing;

    #[async_trait]
    impl PageObserver for Failing {
        async fn notify(&self, _event: PageEvent, _page: &Page) -> Result<(), AppError> {
            Err(AppError::Internal("observer down".into()))
        }
    }

    #[tokio::test]
    async fn test_observers_receive_events() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (engine, _dir) =
            setup_with(vec![Arc::new(Failing), Arc::new(Recorder { events: tx })], false).await;
        let alice = user("alice", &[Permission::Editor]);

        let mut page = engine.create_page(&alice, NewPage::default()).await.unwrap();
        engine.save_page(&mut page, &alice).await.unwrap();

        let created = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        let updated = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();

        let mut events = vec![created, updated];
        events.sort_by_key(|(event, _)| *event == PageEvent::Updated);
        assert_eq!(
            events,
            vec![(PageEvent::Created, page.id), (PageEvent::Updated, page.id)]
        );
    }
}
