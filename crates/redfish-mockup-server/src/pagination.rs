//! `$top` / `$skip` windowing over collection member lists.

use crate::error::ServerError;
use serde_json::{json, Value};

/// Paging parameters parsed from a request query string.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageQuery {
    pub top: Option<usize>,
    pub skip: Option<usize>,
}

impl PageQuery {
    /// Parse `$top` and `$skip` out of a raw query string. Other parameters
    /// are ignored; a recognized parameter that is not a non-negative
    /// integer is rejected.
    pub fn parse(query: Option<&str>) -> Result<Self, ServerError> {
        let mut page = PageQuery::default();
        let Some(query) = query else {
            return Ok(page);
        };
        for pair in query.split('&') {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            let slot = match key {
                "$top" => &mut page.top,
                "$skip" => &mut page.skip,
                _ => continue,
            };
            if slot.is_some() {
                continue; // first occurrence wins
            }
            let parsed = value.parse::<usize>().map_err(|_| {
                ServerError::MalformedQuery(format!("{key} must be a non-negative integer"))
            })?;
            *slot = Some(parsed);
        }
        Ok(page)
    }

    pub fn is_unbounded(&self) -> bool {
        self.top.is_none() && self.skip.is_none()
    }
}

/// Apply the page window to a collection document in place.
///
/// `Members` is sliced; `Members@odata.count` stays the full-collection
/// count. When a `$top` window cuts the list short, `Members@odata.nextLink`
/// points at the following page. Non-collection documents pass through
/// untouched.
pub fn paginate(document: &mut Value, external_path: &str, page: &PageQuery) {
    if page.is_unbounded() {
        return;
    }
    let Some(members) = document.get_mut("Members").and_then(Value::as_array_mut) else {
        return;
    };

    let skip = page.skip.unwrap_or(0).min(members.len());
    members.drain(..skip);

    let mut next_link = None;
    if let Some(top) = page.top {
        if top < members.len() {
            members.truncate(top);
            next_link = Some(format!("{external_path}?$skip={}&$top={top}", skip + top));
        }
    }
    if let Some(link) = next_link {
        document["Members@odata.nextLink"] = json!(link);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collection(count: usize) -> Value {
        let members: Vec<Value> = (1..=count)
            .map(|i| json!({"@odata.id": format!("/redfish/v1/Systems/{i}")}))
            .collect();
        json!({
            "@odata.id": "/redfish/v1/Systems",
            "Members": members,
            "Members@odata.count": count
        })
    }

    #[test]
    fn test_parse_accepts_top_and_skip() {
        let page = PageQuery::parse(Some("$skip=2&$top=3")).unwrap();
        assert_eq!(page, PageQuery { top: Some(3), skip: Some(2) });

        let page = PageQuery::parse(Some("$filter=x&$top=1")).unwrap();
        assert_eq!(page.top, Some(1));
        assert_eq!(page.skip, None);

        assert!(PageQuery::parse(None).unwrap().is_unbounded());
    }

    #[test]
    fn test_parse_rejects_garbage_values() {
        for query in ["$top=abc", "$top=", "$skip=-1", "$skip=1.5"] {
            let err = PageQuery::parse(Some(query)).unwrap_err();
            assert!(matches!(err, ServerError::MalformedQuery(_)), "{query}");
        }
    }

    #[test]
    fn test_window_slices_and_links_next_page() {
        let mut doc = collection(10);
        let page = PageQuery { top: Some(3), skip: Some(2) };
        paginate(&mut doc, "/redfish/v1/Systems", &page);

        let ids: Vec<&str> = doc["Members"]
            .as_array()
            .unwrap()
            .iter()
            .map(|m| m["@odata.id"].as_str().unwrap())
            .collect();
        assert_eq!(
            ids,
            vec![
                "/redfish/v1/Systems/3",
                "/redfish/v1/Systems/4",
                "/redfish/v1/Systems/5"
            ]
        );
        // Count reflects the whole collection, not the page.
        assert_eq!(doc["Members@odata.count"], 10);
        assert_eq!(
            doc["Members@odata.nextLink"],
            "/redfish/v1/Systems?$skip=5&$top=3"
        );
    }

    #[test]
    fn test_final_page_has_no_next_link() {
        let mut doc = collection(10);
        let page = PageQuery { top: Some(3), skip: Some(8) };
        paginate(&mut doc, "/redfish/v1/Systems", &page);

        assert_eq!(doc["Members"].as_array().unwrap().len(), 2);
        assert!(doc.get("Members@odata.nextLink").is_none());
    }

    #[test]
    fn test_skip_past_end_empties_members() {
        let mut doc = collection(3);
        let page = PageQuery { top: None, skip: Some(9) };
        paginate(&mut doc, "/redfish/v1/Systems", &page);
        assert!(doc["Members"].as_array().unwrap().is_empty());
        assert_eq!(doc["Members@odata.count"], 3);
    }

    #[test]
    fn test_non_collection_passes_through() {
        let mut doc = json!({"Id": "1"});
        let page = PageQuery { top: Some(1), skip: None };
        paginate(&mut doc, "/redfish/v1/Systems/1", &page);
        assert_eq!(doc, json!({"Id": "1"}));
    }
}
