//! In-memory document-management API.
//!
//! A folder tree with API-style identifiers. Names are matched
//! case-insensitively, like the hosted APIs this stands in for.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::Mutex;

use labtrack_core::{AppError, AppResult, path};
use labtrack_entity::{DocumentApiDriveDetails, StorageDrive};

use super::client::{ApiItem, ApiItemKind, DocumentApiClient, DocumentApiConnector};

const ROOT_ID: &str = "root";

/// How the next moves should fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MoveFault {
    /// Moves succeed.
    #[default]
    None,
    /// The API rejects the move without applying it.
    Reject,
    /// The API applies the move, then goes down before answering.
    Outage,
    /// The API applies the move but the response is lost.
    LoseResponse,
}

#[derive(Debug, Clone)]
struct Node {
    name: String,
    parent: Option<String>,
    kind: ApiItemKind,
    data: Bytes,
    modified: DateTime<Utc>,
}

#[derive(Debug)]
struct TreeState {
    nodes: HashMap<String, Node>,
    next_id: u64,
    move_fault: MoveFault,
    unreachable: bool,
}

/// One tenant's folder tree held in memory.
#[derive(Debug)]
pub struct MemoryDocumentApi {
    tenant: String,
    state: Mutex<TreeState>,
}

impl MemoryDocumentApi {
    /// Create a tenant containing only the root folder.
    pub fn new(tenant: impl Into<String>) -> Self {
        let mut nodes = HashMap::new();
        nodes.insert(
            ROOT_ID.to_string(),
            Node {
                name: String::new(),
                parent: None,
                kind: ApiItemKind::Folder,
                data: Bytes::new(),
                modified: Utc::now(),
            },
        );
        Self {
            tenant: tenant.into(),
            state: Mutex::new(TreeState {
                nodes,
                next_id: 0,
                move_fault: MoveFault::None,
                unreachable: false,
            }),
        }
    }

    /// Set how subsequent moves fail.
    pub async fn set_move_fault(&self, fault: MoveFault) {
        self.state.lock().await.move_fault = fault;
    }

    /// Make every call fail as if the service were down.
    pub async fn set_unreachable(&self, unreachable: bool) {
        self.state.lock().await.unreachable = unreachable;
    }

    fn check_reachable(state: &TreeState) -> AppResult<()> {
        if state.unreachable {
            return Err(AppError::write_failure("Document API is unreachable"));
        }
        Ok(())
    }

    fn path_of(state: &TreeState, id: &str) -> String {
        let mut names = Vec::new();
        let mut current = state.nodes.get(id);
        while let Some(node) = current {
            if let Some(parent) = &node.parent {
                names.push(node.name.as_str());
                current = state.nodes.get(parent);
            } else {
                break;
            }
        }
        names.reverse();
        let joined = format!("/{}", names.join("/"));
        match state.nodes.get(id).map(|n| n.kind) {
            Some(ApiItemKind::Folder) => path::folder_path(&joined),
            _ => joined,
        }
    }

    fn item(&self, state: &TreeState, id: &str) -> AppResult<ApiItem> {
        let node = state
            .nodes
            .get(id)
            .ok_or_else(|| AppError::not_found(format!("No item with ID '{id}'")))?;
        Ok(ApiItem {
            id: id.to_string(),
            name: node.name.clone(),
            path: Self::path_of(state, id),
            kind: node.kind,
            size: node.data.len() as u64,
            last_modified: Some(node.modified),
            url: Some(format!("memory://{}/nav/{id}", self.tenant)),
        })
    }

    fn child_named(state: &TreeState, parent_id: &str, name: &str) -> Option<String> {
        state
            .nodes
            .iter()
            .find(|(_, n)| {
                n.parent.as_deref() == Some(parent_id) && n.name.eq_ignore_ascii_case(name)
            })
            .map(|(id, _)| id.clone())
    }

    fn folder_node<'a>(state: &'a TreeState, id: &str) -> AppResult<&'a Node> {
        match state.nodes.get(id) {
            Some(node) if node.kind == ApiItemKind::Folder => Ok(node),
            Some(_) => Err(AppError::validation(format!("Item '{id}' is not a folder"))),
            None => Err(AppError::not_found(format!("No folder with ID '{id}'"))),
        }
    }

    fn insert(state: &mut TreeState, parent_id: &str, name: &str, kind: ApiItemKind, data: Bytes) -> String {
        state.next_id += 1;
        let id = format!("item-{}", state.next_id);
        state.nodes.insert(
            id.clone(),
            Node {
                name: name.to_string(),
                parent: Some(parent_id.to_string()),
                kind,
                data,
                modified: Utc::now(),
            },
        );
        id
    }

    fn is_ancestor(state: &TreeState, ancestor: &str, id: &str) -> bool {
        let mut current = Some(id.to_string());
        while let Some(cur) = current {
            if cur == ancestor {
                return true;
            }
            current = state.nodes.get(&cur).and_then(|n| n.parent.clone());
        }
        false
    }
}

#[async_trait]
impl DocumentApiClient for MemoryDocumentApi {
    async fn lookup(&self, item_path: &str) -> AppResult<Option<ApiItem>> {
        let state = self.state.lock().await;
        Self::check_reachable(&state)?;
        let mut current = ROOT_ID.to_string();
        for segment in item_path.split(path::DELIMITER).filter(|s| !s.is_empty()) {
            match Self::child_named(&state, &current, segment) {
                Some(id) => current = id,
                None => return Ok(None),
            }
        }
        self.item(&state, &current).map(Some)
    }

    async fn list_children(&self, folder_id: &str) -> AppResult<Vec<ApiItem>> {
        let state = self.state.lock().await;
        Self::check_reachable(&state)?;
        Self::folder_node(&state, folder_id)?;
        state
            .nodes
            .iter()
            .filter(|(_, n)| n.parent.as_deref() == Some(folder_id))
            .map(|(id, _)| self.item(&state, id))
            .collect()
    }

    async fn create_folder(&self, parent_id: &str, name: &str) -> AppResult<ApiItem> {
        let mut state = self.state.lock().await;
        Self::check_reachable(&state)?;
        Self::folder_node(&state, parent_id)?;
        if Self::child_named(&state, parent_id, name).is_some() {
            return Err(AppError::duplicate(format!("'{name}' already exists")));
        }
        let id = Self::insert(&mut state, parent_id, name, ApiItemKind::Folder, Bytes::new());
        self.item(&state, &id)
    }

    async fn upload_file(&self, folder_id: &str, name: &str, data: Bytes) -> AppResult<ApiItem> {
        let mut state = self.state.lock().await;
        Self::check_reachable(&state)?;
        Self::folder_node(&state, folder_id)?;
        let id = match Self::child_named(&state, folder_id, name) {
            Some(existing) => {
                let node = state
                    .nodes
                    .get_mut(&existing)
                    .ok_or_else(|| AppError::internal("Child vanished during upload"))?;
                if node.kind == ApiItemKind::Folder {
                    return Err(AppError::duplicate(format!("'{name}' is a folder")));
                }
                node.data = data;
                node.modified = Utc::now();
                existing
            }
            None => Self::insert(&mut state, folder_id, name, ApiItemKind::File, data),
        };
        self.item(&state, &id)
    }

    async fn download_file(&self, file_id: &str) -> AppResult<Bytes> {
        let state = self.state.lock().await;
        Self::check_reachable(&state)?;
        match state.nodes.get(file_id) {
            Some(node) if node.kind == ApiItemKind::File => Ok(node.data.clone()),
            _ => Err(AppError::not_found(format!("No file with ID '{file_id}'"))),
        }
    }

    async fn move_item(
        &self,
        item_id: &str,
        new_parent_id: &str,
        new_name: &str,
    ) -> AppResult<ApiItem> {
        let mut state = self.state.lock().await;
        Self::check_reachable(&state)?;
        if state.move_fault == MoveFault::Reject {
            return Err(AppError::write_failure(format!("Move of '{item_id}' rejected")));
        }
        if item_id == ROOT_ID || !state.nodes.contains_key(item_id) {
            return Err(AppError::not_found(format!("No movable item '{item_id}'")));
        }
        Self::folder_node(&state, new_parent_id)?;
        if Self::is_ancestor(&state, item_id, new_parent_id) {
            return Err(AppError::validation("Cannot move a folder into itself"));
        }
        if Self::child_named(&state, new_parent_id, new_name).is_some_and(|id| id != item_id) {
            return Err(AppError::duplicate(format!("'{new_name}' already exists")));
        }

        if let Some(node) = state.nodes.get_mut(item_id) {
            node.parent = Some(new_parent_id.to_string());
            node.name = new_name.to_string();
            node.modified = Utc::now();
        }
        match state.move_fault {
            MoveFault::LoseResponse => {
                return Err(AppError::write_failure("Connection reset while moving"));
            }
            MoveFault::Outage => {
                state.unreachable = true;
                return Err(AppError::write_failure("Document API went away while moving"));
            }
            _ => {}
        }
        self.item(&state, item_id)
    }

    async fn ping(&self) -> AppResult<bool> {
        Ok(!self.state.lock().await.unreachable)
    }
}

/// Hands out one shared in-memory tree per tenant.
#[derive(Debug, Default)]
pub struct MemoryDocumentApiConnector {
    tenants: DashMap<String, Arc<MemoryDocumentApi>>,
    connects: AtomicUsize,
}

impl MemoryDocumentApiConnector {
    /// Create a connector with no tenants.
    pub fn new() -> Self {
        Self::default()
    }

    /// The tenant with the given name, created on first use.
    pub fn tenant(&self, name: &str) -> Arc<MemoryDocumentApi> {
        self.tenants
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(MemoryDocumentApi::new(name)))
            .clone()
    }

    /// How many clients have been handed out.
    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DocumentApiConnector for MemoryDocumentApiConnector {
    async fn connect(
        &self,
        _drive: &StorageDrive,
        details: &DocumentApiDriveDetails,
    ) -> AppResult<Arc<dyn DocumentApiClient>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let tenant: Arc<dyn DocumentApiClient> = self.tenant(&details.tenant);
        Ok(tenant)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use labtrack_core::ErrorKind;

    #[tokio::test]
    async fn test_paths_follow_moves() {
        let api = MemoryDocumentApi::new("acme");
        let shared = api.create_folder(ROOT_ID, "Shared").await.unwrap();
        let study = api.create_folder(&shared.id, "ST-001").await.unwrap();
        assert_eq!(study.path, "/Shared/ST-001/");

        let file = api
            .upload_file(&study.id, "plate.csv", Bytes::from_static(b"a,b"))
            .await
            .unwrap();
        assert_eq!(file.path, "/Shared/ST-001/plate.csv");

        api.move_item(&study.id, ROOT_ID, "ST-002").await.unwrap();
        let moved = api.lookup("/st-002/PLATE.csv").await.unwrap().unwrap();
        assert_eq!(moved.id, file.id);
        assert!(api.lookup("/Shared/ST-001/").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_and_cycle_rejected() {
        let api = MemoryDocumentApi::new("acme");
        let a = api.create_folder(ROOT_ID, "A").await.unwrap();
        let b = api.create_folder(&a.id, "B").await.unwrap();

        let err = api.create_folder(ROOT_ID, "a").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Duplicate);

        let err = api.move_item(&a.id, &b.id, "A").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);
    }
}
