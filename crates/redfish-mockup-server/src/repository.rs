//! Fixture-backed resource repository with copy-on-write semantics.
//!
//! Lookup order is overlay first, disk second: once a path has been written
//! to, the fixture file underneath it is dead to the server. All mutation
//! goes through this type; it is the only writer of [`OverlayStore`].

use crate::error::ServerError;
use crate::overlay::{OverlayEntry, OverlayStore};
use crate::path::ResourcePath;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Where a resolved document came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Fixture,
    Overlay,
}

/// Outcome of a repository lookup.
///
/// `Tombstoned` is deliberately distinct from `NotFound`: both report 404 to
/// GET, but a tombstone means the path existed and was deleted, which
/// matters to callers walking collection membership.
#[derive(Debug, Clone)]
pub enum Resolved {
    NotFound,
    Tombstoned,
    Document { value: Value, origin: Origin },
}

impl Resolved {
    /// The document, when the path resolved to one.
    pub fn into_document(self) -> Option<Value> {
        match self {
            Resolved::Document { value, .. } => Some(value),
            _ => None,
        }
    }
}

/// Resolves canonical paths against the overlay and the on-disk mockup.
pub struct ResourceRepository {
    mock_dir: PathBuf,
    overlay: OverlayStore,
    /// Serializes the compound read-modify-write operations so concurrent
    /// member-list updates cannot interleave.
    mutation: Mutex<()>,
}

impl ResourceRepository {
    pub fn new(mock_dir: PathBuf) -> Self {
        Self {
            mock_dir,
            overlay: OverlayStore::new(),
            mutation: Mutex::new(()),
        }
    }

    /// Directory holding the resource's fixture files (`index.json`,
    /// `headers.json`, `time.json`, raw documents).
    pub fn resource_dir(&self, path: &ResourcePath) -> PathBuf {
        if path.is_root() {
            self.mock_dir.clone()
        } else {
            self.mock_dir.join(path.canonical())
        }
    }

    /// Absolute path of the resource's `index.json`; this is the overlay key.
    pub fn index_path(&self, path: &ResourcePath) -> PathBuf {
        self.resource_dir(path).join("index.json")
    }

    /// Look a path up, overlay first, disk second.
    ///
    /// A fixture that exists but does not parse is a mockup configuration
    /// error and is surfaced, never skipped.
    pub fn resolve(&self, path: &ResourcePath) -> Result<Resolved, ServerError> {
        let index = self.index_path(path);
        if let Some(entry) = self.overlay.get(&index) {
            return Ok(match entry {
                OverlayEntry::Override(value) => Resolved::Document {
                    value,
                    origin: Origin::Overlay,
                },
                OverlayEntry::Tombstone => Resolved::Tombstoned,
            });
        }
        if index.is_file() {
            return Ok(Resolved::Document {
                value: read_fixture(&index)?,
                origin: Origin::Fixture,
            });
        }
        Ok(Resolved::NotFound)
    }

    /// Recursively merge `patch` into the document at `path` and store the
    /// result as an override. Collections reject merge.
    pub fn merge(&self, path: &ResourcePath, patch: &Value) -> Result<Value, ServerError> {
        let _guard = self.mutation.lock();
        let mut current = self
            .resolve(path)?
            .into_document()
            .ok_or_else(|| ServerError::ResourceNotFound(path.external_id().to_string()))?;
        if is_collection(&current) {
            return Err(ServerError::CollectionOperationNotAllowed(
                path.external_id().to_string(),
            ));
        }

        merge_documents(&mut current, patch);
        self.overlay.put_override(self.index_path(path), current.clone());
        debug!(path = %path, "stored merged override");
        Ok(current)
    }

    /// Add a member to the collection at `path`, storing `body` as the new
    /// child's document. Returns the synthesized member id and the updated
    /// collection.
    ///
    /// Candidate ids are `<collection>/<count+1>`, `<count+2>`, ... until
    /// one is neither listed in `Members` nor tombstoned in the overlay.
    /// The member id follows the wire-visible path even in short-form mode,
    /// matching the `@odata.id` convention of the fixtures themselves.
    pub fn create_member(
        &self,
        path: &ResourcePath,
        body: Value,
    ) -> Result<(String, Value), ServerError> {
        let _guard = self.mutation.lock();
        let mut collection = self
            .resolve(path)?
            .into_document()
            .ok_or_else(|| ServerError::ResourceNotFound(path.external_id().to_string()))?;
        let Some(members) = collection.get("Members").and_then(Value::as_array).cloned() else {
            return Err(ServerError::CollectionOperationNotAllowed(
                path.external_id().to_string(),
            ));
        };

        let taken: HashSet<&str> = members
            .iter()
            .filter_map(|m| m.get("@odata.id").and_then(Value::as_str))
            .collect();
        let external_base = path.external_id().trim_end_matches('/');
        let mut probe = 1;
        let (new_id, child_index) = loop {
            let member_number = members.len() + probe;
            let candidate = format!("{external_base}/{member_number}");
            let child_index = self
                .resource_dir(path)
                .join(member_number.to_string())
                .join("index.json");
            let tombstoned =
                matches!(self.overlay.get(&child_index), Some(OverlayEntry::Tombstone));
            if !taken.contains(candidate.as_str()) && !tombstoned {
                break (candidate, child_index);
            }
            probe += 1;
        };

        let mut members = members;
        members.push(json!({ "@odata.id": new_id }));
        let count = members.len();
        collection["Members"] = Value::Array(members);
        collection["Members@odata.count"] = json!(count);

        self.overlay.put_override(child_index, body);
        self.overlay
            .put_override(self.index_path(path), collection.clone());
        debug!(path = %path, member = %new_id, "created collection member");
        Ok((new_id, collection))
    }

    /// Tombstone the resource at `path` and drop it from its parent
    /// collection's member list.
    pub fn delete(&self, path: &ResourcePath) -> Result<(), ServerError> {
        let _guard = self.mutation.lock();
        if self.resolve(path)?.into_document().is_none() {
            return Err(ServerError::ResourceNotFound(path.external_id().to_string()));
        }

        let parent = path.parent();
        let mut parent_doc = match self.resolve(&parent)? {
            Resolved::Document { value, .. } if is_collection(&value) => value,
            _ => {
                return Err(ServerError::CollectionOperationNotAllowed(
                    parent.external_id().to_string(),
                ))
            }
        };

        let member_id = path.external_id();
        if let Some(members) = parent_doc.get_mut("Members").and_then(Value::as_array_mut) {
            members.retain(|m| m.get("@odata.id").and_then(Value::as_str) != Some(member_id));
            let count = members.len();
            parent_doc["Members@odata.count"] = json!(count);
        }

        self.overlay
            .put_override(self.index_path(&parent), parent_doc);
        self.overlay.put_tombstone(self.index_path(path));
        debug!(path = %path, "tombstoned resource");
        Ok(())
    }
}

/// A document is a collection when it carries a `Members` array.
pub fn is_collection(value: &Value) -> bool {
    matches!(value.get("Members"), Some(Value::Array(_)))
}

/// Recursive merge of `patch` into `base`.
///
/// Object keys merge depth-first; everything else, arrays included,
/// overwrites the existing value outright. A mapping is never merged into a
/// non-mapping: the patch value simply replaces it.
pub fn merge_documents(base: &mut Value, patch: &Value) {
    let (Value::Object(base_map), Value::Object(patch_map)) = (base, patch) else {
        return;
    };
    for (key, patch_value) in patch_map {
        match base_map.get_mut(key) {
            Some(existing) if existing.is_object() && patch_value.is_object() => {
                merge_documents(existing, patch_value);
            }
            _ => {
                base_map.insert(key.clone(), patch_value.clone());
            }
        }
    }
}

fn read_fixture(path: &Path) -> Result<Value, ServerError> {
    let raw = fs::read_to_string(path).map_err(|e| ServerError::Fixture {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    serde_json::from_str(&raw).map_err(|e| ServerError::Fixture {
        path: path.display().to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_fixture(root: &Path, canonical: &str, value: &Value) {
        let dir = root.join(canonical);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("index.json"), value.to_string()).unwrap();
    }

    /// Tall mockup with a three-member Systems collection.
    fn mock_tree() -> (TempDir, ResourceRepository) {
        let tmp = TempDir::new().unwrap();
        write_fixture(
            tmp.path(),
            "redfish/v1",
            &json!({"@odata.id": "/redfish/v1", "UUID": "92384634-2938-2342-8820-489239905423"}),
        );
        write_fixture(
            tmp.path(),
            "redfish/v1/Systems",
            &json!({
                "@odata.id": "/redfish/v1/Systems",
                "Members": [
                    {"@odata.id": "/redfish/v1/Systems/1"},
                    {"@odata.id": "/redfish/v1/Systems/2"},
                    {"@odata.id": "/redfish/v1/Systems/3"}
                ],
                "Members@odata.count": 3
            }),
        );
        for id in 1..=3 {
            write_fixture(
                tmp.path(),
                &format!("redfish/v1/Systems/{id}"),
                &json!({"@odata.id": format!("/redfish/v1/Systems/{id}"), "Id": id.to_string()}),
            );
        }
        let repo = ResourceRepository::new(tmp.path().to_path_buf());
        (tmp, repo)
    }

    fn path(raw: &str) -> ResourcePath {
        ResourcePath::resolve(raw, false)
    }

    #[test]
    fn test_resolve_fixture_and_miss() {
        let (_tmp, repo) = mock_tree();
        match repo.resolve(&path("/redfish/v1/Systems/1")).unwrap() {
            Resolved::Document { value, origin } => {
                assert_eq!(origin, Origin::Fixture);
                assert_eq!(value["Id"], "1");
            }
            other => panic!("expected document, got {other:?}"),
        }
        assert!(matches!(
            repo.resolve(&path("/redfish/v1/Nope")).unwrap(),
            Resolved::NotFound
        ));
    }

    #[test]
    fn test_malformed_fixture_is_surfaced() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("redfish/v1/Broken");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("index.json"), "{not json").unwrap();

        let repo = ResourceRepository::new(tmp.path().to_path_buf());
        let err = repo.resolve(&path("/redfish/v1/Broken")).unwrap_err();
        assert!(matches!(err, ServerError::Fixture { .. }));
    }

    #[test]
    fn test_merge_is_deep_for_objects() {
        let (_tmp, repo) = mock_tree();
        let target = path("/redfish/v1/Systems/1");
        repo.merge(&target, &json!({"A": {"B": 0, "C": 2}})).unwrap();

        let merged = repo.merge(&target, &json!({"A": {"B": 1}})).unwrap();
        assert_eq!(merged["A"], json!({"B": 1, "C": 2}));
        // Untouched keys survive.
        assert_eq!(merged["Id"], "1");

        // The merged document is now what resolve returns, tagged overlay.
        match repo.resolve(&target).unwrap() {
            Resolved::Document { value, origin } => {
                assert_eq!(origin, Origin::Overlay);
                assert_eq!(value["A"]["C"], 2);
            }
            other => panic!("expected document, got {other:?}"),
        }
    }

    #[test]
    fn test_merge_scalar_replaces_object() {
        let (_tmp, repo) = mock_tree();
        let target = path("/redfish/v1/Systems/1");
        repo.merge(&target, &json!({"A": {"B": 0}})).unwrap();
        let merged = repo.merge(&target, &json!({"A": 7})).unwrap();
        assert_eq!(merged["A"], 7);
    }

    #[test]
    fn test_merge_arrays_overwrite() {
        let (_tmp, repo) = mock_tree();
        let target = path("/redfish/v1/Systems/1");
        repo.merge(&target, &json!({"Tags": [1, 2, 3]})).unwrap();
        let merged = repo.merge(&target, &json!({"Tags": [9]})).unwrap();
        assert_eq!(merged["Tags"], json!([9]));
    }

    #[test]
    fn test_merge_rejects_collections_and_missing_targets() {
        let (_tmp, repo) = mock_tree();
        let err = repo
            .merge(&path("/redfish/v1/Systems"), &json!({"x": 1}))
            .unwrap_err();
        assert!(matches!(err, ServerError::CollectionOperationNotAllowed(_)));

        let err = repo
            .merge(&path("/redfish/v1/Missing"), &json!({"x": 1}))
            .unwrap_err();
        assert!(matches!(err, ServerError::ResourceNotFound(_)));
    }

    #[test]
    fn test_create_member_appends_and_stores_child() {
        let (_tmp, repo) = mock_tree();
        let collection = path("/redfish/v1/Systems");
        let (id, updated) = repo
            .create_member(&collection, json!({"Name": "new system"}))
            .unwrap();

        assert_eq!(id, "/redfish/v1/Systems/4");
        assert_eq!(updated["Members@odata.count"], 4);
        assert_eq!(
            updated["Members"][3],
            json!({"@odata.id": "/redfish/v1/Systems/4"})
        );

        let child = repo
            .resolve(&path("/redfish/v1/Systems/4"))
            .unwrap()
            .into_document()
            .unwrap();
        assert_eq!(child["Name"], "new system");
    }

    #[test]
    fn test_create_member_ids_advance_with_count() {
        let (_tmp, repo) = mock_tree();
        let collection = path("/redfish/v1/Systems");
        let (first, _) = repo.create_member(&collection, json!({})).unwrap();
        assert_eq!(first, "/redfish/v1/Systems/4");
        // Four members now; the next candidate is 5 and free.
        let (second, updated) = repo.create_member(&collection, json!({})).unwrap();
        assert_eq!(second, "/redfish/v1/Systems/5");
        assert_eq!(updated["Members@odata.count"], 5);
    }

    #[test]
    fn test_create_member_skips_id_already_in_members() {
        let tmp = TempDir::new().unwrap();
        // Three members whose ids already include the first candidate "/Chassis/4".
        write_fixture(
            tmp.path(),
            "redfish/v1/Chassis",
            &json!({
                "Members": [
                    {"@odata.id": "/redfish/v1/Chassis/2"},
                    {"@odata.id": "/redfish/v1/Chassis/3"},
                    {"@odata.id": "/redfish/v1/Chassis/4"}
                ],
                "Members@odata.count": 3
            }),
        );
        let repo = ResourceRepository::new(tmp.path().to_path_buf());
        let (id, _) = repo
            .create_member(&path("/redfish/v1/Chassis"), json!({}))
            .unwrap();
        assert_eq!(id, "/redfish/v1/Chassis/5");
    }

    #[test]
    fn test_create_member_rejects_non_collection() {
        let (_tmp, repo) = mock_tree();
        let err = repo
            .create_member(&path("/redfish/v1/Systems/1"), json!({}))
            .unwrap_err();
        assert!(matches!(err, ServerError::CollectionOperationNotAllowed(_)));
    }

    #[test]
    fn test_delete_updates_parent_and_tombstones() {
        let (tmp, repo) = mock_tree();
        let target = path("/redfish/v1/Systems/2");
        repo.delete(&target).unwrap();

        // Parent lost exactly the one member and its count dropped.
        let parent = repo
            .resolve(&path("/redfish/v1/Systems"))
            .unwrap()
            .into_document()
            .unwrap();
        assert_eq!(parent["Members@odata.count"], 2);
        let ids: Vec<&str> = parent["Members"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|m| m["@odata.id"].as_str())
            .collect();
        assert_eq!(ids, vec!["/redfish/v1/Systems/1", "/redfish/v1/Systems/3"]);

        // Target is tombstoned even though its fixture is still on disk.
        assert!(matches!(
            repo.resolve(&target).unwrap(),
            Resolved::Tombstoned
        ));
        assert!(tmp.path().join("redfish/v1/Systems/2/index.json").is_file());

        // Deleting again reports not-found (tombstone is not a document).
        let err = repo.delete(&target).unwrap_err();
        assert!(matches!(err, ServerError::ResourceNotFound(_)));
    }

    #[test]
    fn test_delete_requires_collection_parent() {
        let (_tmp, repo) = mock_tree();
        // The service root is not a collection, so deleting its child fails.
        let err = repo.delete(&path("/redfish/v1/Systems")).unwrap_err();
        assert!(matches!(err, ServerError::CollectionOperationNotAllowed(_)));
    }

    #[test]
    fn test_delete_replaces_prior_override_with_tombstone() {
        let (_tmp, repo) = mock_tree();
        let target = path("/redfish/v1/Systems/3");
        repo.merge(&target, &json!({"Name": "patched"})).unwrap();
        repo.delete(&target).unwrap();
        // The earlier override cannot resurface behind the tombstone.
        assert!(matches!(
            repo.resolve(&target).unwrap(),
            Resolved::Tombstoned
        ));
    }

    #[test]
    fn test_create_member_skips_tombstoned_candidate() {
        let (_tmp, repo) = mock_tree();
        // Delete member 3: collection now has 2 members and a tombstone at /3.
        repo.delete(&path("/redfish/v1/Systems/3")).unwrap();

        // First candidate is count+1 == 3, which is absent from Members but
        // tombstoned, so probing moves on to the next free integer.
        let (id, _) = repo
            .create_member(&path("/redfish/v1/Systems"), json!({"Name": "fresh"}))
            .unwrap();
        assert_eq!(id, "/redfish/v1/Systems/4");
        assert!(matches!(
            repo.resolve(&path("/redfish/v1/Systems/3")).unwrap(),
            Resolved::Tombstoned
        ));
        let doc = repo
            .resolve(&path("/redfish/v1/Systems/4"))
            .unwrap()
            .into_document()
            .unwrap();
        assert_eq!(doc["Name"], "fresh");
    }

    #[test]
    fn test_create_member_uses_wire_ids_in_short_form() {
        let tmp = TempDir::new().unwrap();
        write_fixture(
            tmp.path(),
            "Systems",
            &json!({
                "Members": [{"@odata.id": "/redfish/v1/Systems/1"}],
                "Members@odata.count": 1
            }),
        );
        let repo = ResourceRepository::new(tmp.path().to_path_buf());

        // Client addresses the collection by its full URI; the tree is rooted
        // at the service root.
        let collection = ResourcePath::resolve("/redfish/v1/Systems", true);
        let (id, _) = repo.create_member(&collection, json!({"Id": "2"})).unwrap();
        assert_eq!(id, "/redfish/v1/Systems/2");

        // The stored child resolves through the shortened layout.
        let child = ResourcePath::resolve("/redfish/v1/Systems/2", true);
        assert!(repo.resolve(&child).unwrap().into_document().is_some());
    }

    #[test]
    fn test_merge_documents_cases() {
        let mut base = json!({"A": {"B": 0, "C": 2}, "K": 1});
        merge_documents(&mut base, &json!({"A": {"B": 1}, "New": true}));
        assert_eq!(base, json!({"A": {"B": 1, "C": 2}, "K": 1, "New": true}));

        // Mapping never merged into a non-mapping: replace outright.
        let mut base = json!({"A": 5});
        merge_documents(&mut base, &json!({"A": {"B": 1}}));
        assert_eq!(base, json!({"A": {"B": 1}}));
    }
}
