//! Property-based tests for history pagination
//!
//! Uses proptest to generate history sizes and page indexes and checks the
//! page window against a model.

use std::sync::Arc;

use chatline::backend::auth::Identity;
use chatline::backend::media::{FsMediaStore, MediaPipeline};
use chatline::backend::messaging::messages::next_page;
use chatline::backend::messaging::{MessagingEngine, PAGE_SIZE};
use chatline::backend::store::{InMemoryStore, Store};
use chatline::shared::event::{MessageListRequest, ServerEvent};
use chatline::shared::messaging::{MediaUrls, NewMessage, NewUser};
use proptest::prelude::*;

use crate::common::FixedTranscoder;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

/// Ids on page `page` of a history of `total` messages, per the model
fn model_page(total: u64, page: u32) -> Vec<i64> {
    let newest_first: Vec<i64> = (1..=total as i64).rev().collect();
    newest_first
        .into_iter()
        .skip(page as usize * PAGE_SIZE as usize)
        .take(PAGE_SIZE as usize)
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn test_page_matches_model(total in 0u64..50, page in 0u32..5) {
        let (ids, next) = runtime().block_on(async {
            let dir = tempfile::tempdir().unwrap();
            let store = Arc::new(InMemoryStore::new());
            store.create_user(NewUser::new("alice", "a", "a")).await.unwrap();
            store.create_user(NewUser::new("bob", "b", "b")).await.unwrap();
            let (connection, _) = store.get_or_create_connection("alice", "bob").await.unwrap();
            for i in 0..total {
                store
                    .create_message(NewMessage::text(connection.id, "alice", Some(format!("m{}", i))))
                    .await
                    .unwrap();
            }

            let shared: Arc<dyn Store> = store;
            let media = MediaPipeline::new(
                Arc::new(FsMediaStore::new(dir.path())),
                Arc::new(FixedTranscoder),
                shared.clone(),
            );
            let engine = MessagingEngine::new(shared, media, MediaUrls::new("http://x", "/media/"));
            let caller = Identity { username: "bob".to_string() };
            let dispatches = engine
                .message_list(&caller, &MessageListRequest { connection_id: connection.id, page })
                .await
                .unwrap();
            match &dispatches[0].event {
                ServerEvent::MessageList(page) => (
                    page.messages.iter().map(|m| m.id).collect::<Vec<_>>(),
                    page.next,
                ),
                other => panic!("unexpected {:?}", other),
            }
        });

        prop_assert_eq!(ids, model_page(total, page));
        let remaining = total > (u64::from(page) + 1) * u64::from(PAGE_SIZE);
        prop_assert_eq!(next, if remaining { Some(page + 1) } else { None });
    }

    #[test]
    fn test_next_page_null_iff_exhausted(total in 0u64..10_000, page in 0u32..1_000) {
        let next = next_page(page, total);
        let shown = (u64::from(page) + 1) * u64::from(PAGE_SIZE);
        prop_assert_eq!(next.is_none(), total <= shown);
        if let Some(next) = next {
            prop_assert_eq!(next, page + 1);
        }
    }
}
