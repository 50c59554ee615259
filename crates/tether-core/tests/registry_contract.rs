use std::sync::Arc;
use std::time::Duration;

use tether_core::database::{Database, DatabaseConfig, SessionFactory};
use tether_core::models::{CoreErrorKind, TaskKey};
use tether_core::queries::ambient;
use tether_core::registry::{SessionRegistry, with_current_session};
use tether_core::task_context::{current_task_key, with_task_key};

fn factory(name: &str) -> SessionFactory {
    let database = Database::open(DatabaseConfig {
        name: name.to_string(),
        echo: false,
    })
    .unwrap();
    SessionFactory::new(database)
}

#[test]
fn put_overwrites_and_returns_displaced_session() {
    let factory = factory("registry_overwrite");
    let registry = SessionRegistry::new();
    let key = TaskKey::Pinned(1);
    let first = factory.create().unwrap();
    let second = factory.create().unwrap();

    assert!(registry.put(key, first.clone()).unwrap().is_none());
    let displaced = registry.put(key, second.clone()).unwrap().unwrap();

    assert!(displaced.same_session(&first));
    assert!(registry.lookup(key).unwrap().same_session(&second));
    assert_eq!(registry.len().unwrap(), 1);
}

#[test]
fn remove_of_absent_key_is_a_no_op() {
    let registry = SessionRegistry::new();

    assert!(registry.remove(TaskKey::Pinned(404)).unwrap().is_none());
    assert!(registry.is_empty().unwrap());
}

#[test]
fn lookup_of_unregistered_identity_is_session_not_found() {
    let registry = SessionRegistry::new();
    let error = registry.lookup(TaskKey::Pinned(7)).unwrap_err();

    assert_eq!(error.kind, CoreErrorKind::SessionNotFound);
    assert_eq!(error.task, Some(TaskKey::Pinned(7)));
    assert_eq!(error.message, "session not found");
}

#[tokio::test]
async fn current_outside_a_task_has_no_identity() {
    let registry = SessionRegistry::new();
    let error = registry.current().unwrap_err();

    assert_eq!(error.kind, CoreErrorKind::NoCurrentTask);
}

#[tokio::test]
async fn nested_helpers_find_the_session_registered_by_their_task() {
    let factory = factory("registry_nested");
    let registry = Arc::new(SessionRegistry::new());

    let (first, second, key) = tokio::spawn({
        let registry = registry.clone();
        async move {
            let guard = registry
                .register_current(factory.create().unwrap())
                .unwrap();
            let first = ambient::first_data(&registry).await.unwrap();
            let second = ambient::second_data(&registry).await.unwrap();
            (first, second, guard.key())
        }
    })
    .await
    .unwrap();

    assert_eq!((first, second), (1, 2));
    assert!(matches!(key, TaskKey::Runtime(_)));
    assert!(!registry.contains(key).unwrap());
    assert!(registry.is_empty().unwrap());
}

#[tokio::test]
async fn guard_removes_entry_when_the_body_fails() {
    let factory = factory("registry_error_path");
    let registry = Arc::new(SessionRegistry::new());

    let outcome = tokio::spawn({
        let registry = registry.clone();
        async move {
            let _guard = registry
                .register_current(factory.create().unwrap())
                .unwrap();
            let session = registry.current()?;
            session.execute("SELECT * FROM missing_table").await
        }
    })
    .await
    .unwrap();

    assert_eq!(outcome.unwrap_err().kind, CoreErrorKind::StorageFailure);
    assert!(registry.is_empty().unwrap());
}

#[tokio::test]
async fn guard_leaves_an_entry_that_was_overwritten() {
    let factory = factory("registry_guard_overwrite");
    let registry = SessionRegistry::new();

    with_task_key(11, async {
        let replacement = factory.create().unwrap();
        {
            let _guard = registry
                .register_current(factory.create().unwrap())
                .unwrap();
            registry
                .put(TaskKey::Pinned(11), replacement.clone())
                .unwrap();
        }
        assert!(registry.current().unwrap().same_session(&replacement));
    })
    .await;
}

#[tokio::test]
async fn view_does_not_close_the_session_between_helpers() {
    let factory = factory("registry_view");
    let registry = SessionRegistry::new();

    with_task_key(21, async {
        let _guard = registry
            .register_current(factory.create().unwrap())
            .unwrap();

        with_current_session(&registry, |session| async move {
            session.execute("SELECT 1").await
        })
        .await
        .unwrap();

        let value = ambient::second_data(&registry).await.unwrap();
        assert_eq!(value, 2);
    })
    .await;
}

#[tokio::test]
async fn overlapping_tasks_only_see_their_own_sessions() {
    let factory = factory("registry_overlap");
    let registry = Arc::new(SessionRegistry::new());

    let handles: Vec<_> = (0..2)
        .map(|_| {
            let registry = registry.clone();
            let session = factory.create().unwrap();
            tokio::spawn(async move {
                let own = session.id();
                let _guard = registry.register_current(session).unwrap();
                tokio::time::sleep(Duration::from_millis(20)).await;
                let seen = registry.current().unwrap().id();
                let values = (
                    ambient::first_data(&registry).await.unwrap(),
                    ambient::second_data(&registry).await.unwrap(),
                );
                (own, seen, values)
            })
        })
        .collect();

    for handle in handles {
        let (own, seen, values) = handle.await.unwrap();
        assert_eq!(own, seen);
        assert_eq!(values, (1, 2));
    }
    assert!(registry.is_empty().unwrap());
}

#[tokio::test]
async fn registration_from_a_spawned_hook_is_invisible_to_the_caller() {
    let factory = factory("registry_hook");
    let registry = Arc::new(SessionRegistry::new());

    let outcome = tokio::spawn({
        let registry = registry.clone();
        async move {
            let hook_key = tokio::spawn({
                let registry = registry.clone();
                async move {
                    let key = current_task_key().unwrap();
                    registry.put(key, factory.create().unwrap()).unwrap();
                    key
                }
            })
            .await
            .unwrap();

            assert_ne!(Some(hook_key), current_task_key());
            let outcome = ambient::first_data(&registry).await;
            registry.remove(hook_key).unwrap();
            outcome
        }
    })
    .await
    .unwrap();

    assert_eq!(outcome.unwrap_err().kind, CoreErrorKind::SessionNotFound);
}

#[tokio::test]
async fn global_registry_is_a_single_instance() {
    assert!(std::ptr::eq(
        SessionRegistry::global(),
        SessionRegistry::global()
    ));

    let key = TaskKey::Pinned(u64::MAX);
    let session = factory("registry_global").create().unwrap();
    SessionRegistry::global().put(key, session).unwrap();
    assert!(SessionRegistry::global().contains(key).unwrap());
    SessionRegistry::global().remove(key).unwrap();
    assert!(!SessionRegistry::global().contains(key).unwrap());
}
