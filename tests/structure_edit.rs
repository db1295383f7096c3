use std::sync::Arc;

use bookwright::notify::NotificationQueue;
use bookwright::store::{ContentStore, MemoryStore, MoveDirection};
use bookwright::structure::StructureMutator;
use bookwright::tree::DocumentTree;

mod support;
use support::{AlwaysConfirm, empty_book};

fn mutator(store: Arc<dyn ContentStore>, confirm: bool) -> (StructureMutator, Arc<NotificationQueue>) {
    let notices = Arc::new(NotificationQueue::default());
    (
        StructureMutator::new(store, Arc::new(AlwaysConfirm(confirm)), Arc::clone(&notices)),
        notices,
    )
}

#[tokio::test]
async fn build_chapter_and_reorder_sections() {
    let store = Arc::new(MemoryStore::new());
    store.insert_book(empty_book("b1"));
    let mut tree = DocumentTree::new(store.book("b1").unwrap());
    let (mutator, _notices) = mutator(Arc::clone(&store) as Arc<dyn ContentStore>, true);

    let ch = mutator.add_chapter(&mut tree, "Intro").await.unwrap();
    mutator.add_section(&mut tree, &ch, "A").await.unwrap();
    mutator.add_section(&mut tree, &ch, "B").await.unwrap();
    let c = mutator.add_section(&mut tree, &ch, "C").await.unwrap();

    let indexes: Vec<usize> = tree
        .chapter(&ch)
        .unwrap()
        .sections
        .iter()
        .map(|s| s.order_index)
        .collect();
    assert_eq!(indexes, [0, 1, 2]);

    mutator.move_section(&mut tree, &c, &ch, MoveDirection::Up).await;
    mutator.move_section(&mut tree, &c, &ch, MoveDirection::Up).await;

    let titles: Vec<String> = tree
        .chapter(&ch)
        .unwrap()
        .sections
        .iter()
        .map(|s| s.title.clone())
        .collect();
    assert_eq!(titles, ["C", "A", "B"]);
    assert!(tree.order_indexes_are_dense());

    // Local and persisted views agree.
    let persisted: Vec<String> = store.book("b1").unwrap().chapters[0]
        .sections
        .iter()
        .map(|s| s.title.clone())
        .collect();
    assert_eq!(persisted, ["C", "A", "B"]);
}

#[tokio::test]
async fn deleting_a_chapter_leaves_no_orphan_buffers() {
    let (store, mut tree, chapter_id, section_ids) =
        support::seeded_workspace(&["A", "B"]).await;
    for section_id in &section_ids {
        store
            .create_buffer(section_id, "b1", "Buffer 2", "", bookwright::model::BufferKind::Draft)
            .await
            .unwrap();
    }
    let (mutator, _notices) = mutator(Arc::clone(&store) as Arc<dyn ContentStore>, true);

    mutator.delete_chapter(&mut tree, &chapter_id).await;

    assert!(tree.book().chapters.is_empty());
    for section_id in &section_ids {
        assert!(store.buffers_for_section(section_id).is_empty());
    }
}

#[tokio::test]
async fn failed_move_is_not_applied_locally() {
    let (store, mut tree, chapter_id, section_ids) =
        support::seeded_workspace(&["A", "B"]).await;
    let flaky = Arc::new(support::FlakyStore::new(Arc::clone(&store)));
    flaky.fail("move_section");
    let (mutator, notices) = mutator(Arc::clone(&flaky) as Arc<dyn ContentStore>, true);

    mutator
        .move_section(&mut tree, &section_ids[1], &chapter_id, MoveDirection::Up)
        .await;

    let titles: Vec<String> = tree
        .chapter(&chapter_id)
        .unwrap()
        .sections
        .iter()
        .map(|s| s.title.clone())
        .collect();
    assert_eq!(titles, ["A", "B"]);
    assert_eq!(notices.active().len(), 1);
}

#[tokio::test]
async fn deleting_active_section_moves_selection_to_next_sibling() {
    let (store, mut tree, chapter_id, section_ids) =
        support::seeded_workspace(&["A", "B", "C"]).await;
    tree.set_active_section(Some(section_ids[1].clone()));
    let (mutator, _notices) = mutator(Arc::clone(&store) as Arc<dyn ContentStore>, true);

    mutator
        .delete_section(&mut tree, &section_ids[1], &chapter_id)
        .await;

    assert_eq!(tree.active_section_id(), Some(section_ids[2].as_str()));
    assert!(tree.order_indexes_are_dense());
}
