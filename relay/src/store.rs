//! In-memory persistence tables behind the whiteboard REST boundary.
//!
//! DESIGN
//! ======
//! The relay doubles as the persistence backend for pages and shapes; the
//! tables live inside [`BoardState`] and survive as long as the process.
//! Operations hold the board lock for the duration of one mutation, so each
//! call is atomic from any client's point of view. The relay never inspects
//! a shape body; rows pass through as opaque `jsonDate` strings.

use tracing::info;

use wire::PageInfo;

use crate::state::{AppState, BoardState, ShapeRow};

/// Errors from persistence operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("whiteboard {0} has no persisted state")]
    WhiteboardNotFound(i64),
    #[error("page {page_id} not found on whiteboard {whiteboard_id}")]
    PageNotFound { whiteboard_id: i64, page_id: i64 },
}

/// All pages of a whiteboard. An untouched whiteboard lists as empty.
pub async fn list_pages(state: &AppState, whiteboard_id: i64) -> Vec<PageInfo> {
    let boards = state.boards.read().await;
    boards.get(&whiteboard_id).map(BoardState::page_infos).unwrap_or_default()
}

/// Create a page with a server-assigned id.
pub async fn create_page(state: &AppState, whiteboard_id: i64, title: &str) -> PageInfo {
    let mut boards = state.boards.write().await;
    let board = boards.entry(whiteboard_id).or_insert_with(BoardState::new);
    let page_id = board.assign_page_id();
    board.pages.insert(page_id, title.to_owned());
    info!(whiteboard_id, page_id, "page created");
    PageInfo { page_id, page_title: title.to_owned() }
}

/// Rename a page.
///
/// # Errors
///
/// [`StoreError`] when the whiteboard or page does not exist.
pub async fn rename_page(
    state: &AppState,
    whiteboard_id: i64,
    page_id: i64,
    title: &str,
) -> Result<(), StoreError> {
    let mut boards = state.boards.write().await;
    let board = boards
        .get_mut(&whiteboard_id)
        .ok_or(StoreError::WhiteboardNotFound(whiteboard_id))?;
    let entry = board
        .pages
        .get_mut(&page_id)
        .ok_or(StoreError::PageNotFound { whiteboard_id, page_id })?;
    title.clone_into(entry);
    Ok(())
}

/// Delete a page and drop its shapes.
///
/// # Errors
///
/// [`StoreError`] when the whiteboard or page does not exist.
pub async fn delete_page(
    state: &AppState,
    whiteboard_id: i64,
    page_id: i64,
) -> Result<(), StoreError> {
    let mut boards = state.boards.write().await;
    let board = boards
        .get_mut(&whiteboard_id)
        .ok_or(StoreError::WhiteboardNotFound(whiteboard_id))?;
    if board.pages.remove(&page_id).is_none() {
        return Err(StoreError::PageNotFound { whiteboard_id, page_id });
    }
    board.shapes.remove(&page_id);
    info!(whiteboard_id, page_id, "page deleted");
    Ok(())
}

/// All persisted shapes of one page.
///
/// # Errors
///
/// [`StoreError::PageNotFound`] when the page does not exist.
pub async fn list_shapes(
    state: &AppState,
    whiteboard_id: i64,
    page_id: i64,
) -> Result<Vec<ShapeRow>, StoreError> {
    let boards = state.boards.read().await;
    let board = boards
        .get(&whiteboard_id)
        .ok_or(StoreError::WhiteboardNotFound(whiteboard_id))?;
    if !board.pages.contains_key(&page_id) {
        return Err(StoreError::PageNotFound { whiteboard_id, page_id });
    }
    Ok(board
        .shapes
        .get(&page_id)
        .map(|rows| rows.values().cloned().collect())
        .unwrap_or_default())
}

/// Upsert a batch of shape rows for one page. Serves both the save and the
/// update endpoints; the clients treat them as distinct calls but the
/// in-memory table has no reason to.
///
/// # Errors
///
/// [`StoreError::PageNotFound`] when the page does not exist.
pub async fn upsert_shapes(
    state: &AppState,
    whiteboard_id: i64,
    page_id: i64,
    rows: Vec<ShapeRow>,
) -> Result<(), StoreError> {
    let mut boards = state.boards.write().await;
    let board = boards
        .get_mut(&whiteboard_id)
        .ok_or(StoreError::WhiteboardNotFound(whiteboard_id))?;
    if !board.pages.contains_key(&page_id) {
        return Err(StoreError::PageNotFound { whiteboard_id, page_id });
    }
    let table = board.shapes.entry(page_id).or_default();
    for row in rows {
        table.insert(row.id.clone(), row);
    }
    Ok(())
}

/// Delete a batch of shapes by id. Unknown ids are ignored.
///
/// # Errors
///
/// [`StoreError::PageNotFound`] when the page does not exist.
pub async fn delete_shapes(
    state: &AppState,
    whiteboard_id: i64,
    page_id: i64,
    ids: &[String],
) -> Result<(), StoreError> {
    let mut boards = state.boards.write().await;
    let board = boards
        .get_mut(&whiteboard_id)
        .ok_or(StoreError::WhiteboardNotFound(whiteboard_id))?;
    if !board.pages.contains_key(&page_id) {
        return Err(StoreError::PageNotFound { whiteboard_id, page_id });
    }
    if let Some(table) = board.shapes.get_mut(&page_id) {
        for id in ids {
            table.remove(id);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_helpers::state_with_pages;

    fn row(id: &str) -> ShapeRow {
        ShapeRow { id: id.to_owned(), json_date: format!(r#"{{"id":"{id}"}}"#) }
    }

    #[tokio::test]
    async fn create_assigns_monotonic_ids_per_board() {
        let state = AppState::new();
        let first = create_page(&state, 3, "One").await;
        let second = create_page(&state, 3, "Two").await;
        let other_board = create_page(&state, 4, "Solo").await;

        assert_eq!(first.page_id, 1);
        assert_eq!(second.page_id, 2);
        assert_eq!(other_board.page_id, 1, "ids are per-whiteboard");
        assert_eq!(list_pages(&state, 3).await.len(), 2);
    }

    #[tokio::test]
    async fn untouched_whiteboard_lists_no_pages() {
        let state = AppState::new();
        assert!(list_pages(&state, 99).await.is_empty());
    }

    #[tokio::test]
    async fn rename_rejects_unknown_pages() {
        let state = state_with_pages(3, &[(1, "Home")]).await;
        rename_page(&state, 3, 1, "Renamed").await.expect("rename");
        assert_eq!(list_pages(&state, 3).await[0].page_title, "Renamed");

        let missing = rename_page(&state, 3, 42, "Ghost").await;
        assert!(matches!(missing, Err(StoreError::PageNotFound { page_id: 42, .. })));
    }

    #[tokio::test]
    async fn deleting_a_page_drops_its_shapes() {
        let state = state_with_pages(3, &[(1, "Home"), (2, "Scratch")]).await;
        upsert_shapes(&state, 3, 2, vec![row("shape:s1")]).await.expect("save");

        delete_page(&state, 3, 2).await.expect("delete");

        assert_eq!(list_pages(&state, 3).await.len(), 1);
        let listed = list_shapes(&state, 3, 2).await;
        assert!(matches!(listed, Err(StoreError::PageNotFound { page_id: 2, .. })));
    }

    #[tokio::test]
    async fn shape_batches_upsert_and_delete_by_id() {
        let state = state_with_pages(3, &[(1, "Home")]).await;
        upsert_shapes(&state, 3, 1, vec![row("shape:s1"), row("shape:s2")])
            .await
            .expect("save");
        upsert_shapes(&state, 3, 1, vec![row("shape:s1")]).await.expect("update");

        assert_eq!(list_shapes(&state, 3, 1).await.expect("list").len(), 2);

        delete_shapes(&state, 3, 1, &["shape:s1".to_owned(), "shape:missing".to_owned()])
            .await
            .expect("delete");
        let rows = list_shapes(&state, 3, 1).await.expect("list");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, "shape:s2");
    }

    #[tokio::test]
    async fn shapes_on_an_unknown_page_are_rejected() {
        let state = state_with_pages(3, &[(1, "Home")]).await;
        let saved = upsert_shapes(&state, 3, 42, vec![row("shape:s1")]).await;
        assert!(matches!(saved, Err(StoreError::PageNotFound { page_id: 42, .. })));
    }
}
