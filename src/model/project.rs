pub const DEFAULT_MAX_THREADS_PER_AGENT: u32 = 50;
pub const DEFAULT_BREAKUP_INTERVALS: &str = "1,3,5";

#[derive(Debug, Clone)]
pub struct Project {
    pub id: i64,
    pub project_code: String,
    pub max_threads_per_agent: u32,
    pub master_slave_mode: bool,
    pub samples_breakup_interval: String,
    /// Fingerprint of the last applied configuration; `None` means the
    /// project has never been set up (or the last setup failed).
    pub serial_version: Option<String>,
}

impl Project {
    pub fn new(project_code: &str) -> Self {
        Project {
            id: 0,
            project_code: slugify(project_code),
            max_threads_per_agent: DEFAULT_MAX_THREADS_PER_AGENT,
            master_slave_mode: true,
            samples_breakup_interval: DEFAULT_BREAKUP_INTERVALS.to_owned(),
            serial_version: None,
        }
    }

    /// Breakup bucket edges in seconds, parsed from the comma list.
    /// Unparseable entries are dropped rather than failing the report.
    pub fn breakup_intervals(&self) -> Vec<f64> {
        self.samples_breakup_interval
            .split(',')
            .filter_map(|part| part.trim().parse::<f64>().ok())
            .collect()
    }
}

/// Project codes are slugs: every non-alphanumeric byte becomes `_`.
pub fn slugify(code: &str) -> String {
    code.trim()
        .chars()
        .map(|ch| if ch.is_ascii_alphanumeric() { ch } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_replaces_non_alphanumerics() {
        assert_eq!(slugify("shop checkout v2.1"), "shop_checkout_v2_1");
        assert_eq!(slugify("already_ok_123"), "already_ok_123");
        assert!(slugify("weird/name:here")
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '_'));
    }

    #[test]
    fn breakup_intervals_parse_the_comma_list() {
        let mut project = Project::new("demo");
        assert_eq!(project.breakup_intervals(), vec![1.0, 3.0, 5.0]);

        project.samples_breakup_interval = "0.5, 2, bogus, 10".to_owned();
        assert_eq!(project.breakup_intervals(), vec![0.5, 2.0, 10.0]);
    }
}
