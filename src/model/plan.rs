use std::collections::BTreeMap;

#[derive(Debug, Clone)]
pub struct JmeterPlan {
    pub id: i64,
    pub project_id: i64,
    pub test_plan_name: String,
    pub content_hash: String,
    /// Plans removed from the configuration are kept for historical cycles
    /// but flipped inactive.
    pub active: bool,
    pub properties: BTreeMap<String, String>,
    pub latest_threads_count: u32,
}

impl JmeterPlan {
    pub fn properties_json(&self) -> String {
        serde_json::to_string(&self.properties).unwrap_or_else(|_| "{}".to_owned())
    }

    pub fn properties_from_json(text: &str) -> BTreeMap<String, String> {
        serde_json::from_str(text).unwrap_or_default()
    }
}
