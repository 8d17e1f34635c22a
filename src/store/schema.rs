pub(super) const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS projects (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    project_code TEXT NOT NULL UNIQUE,
    max_threads_per_agent INTEGER NOT NULL DEFAULT 50,
    master_slave_mode INTEGER NOT NULL DEFAULT 1,
    samples_breakup_interval TEXT NOT NULL DEFAULT '1,3,5',
    serial_version TEXT
);

CREATE TABLE IF NOT EXISTS amazon_clouds (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    access_key TEXT NOT NULL,
    secret_key TEXT NOT NULL,
    ssh_identity TEXT NOT NULL,
    region TEXT NOT NULL,
    zone TEXT,
    agent_ami TEXT,
    active INTEGER NOT NULL DEFAULT 0,
    user_name TEXT NOT NULL DEFAULT 'ubuntu',
    security_group TEXT NOT NULL,
    instance_type TEXT NOT NULL DEFAULT 'm5.large',
    max_threads_by_instance INTEGER,
    autogenerated_ssh_key INTEGER NOT NULL DEFAULT 0,
    ssh_port INTEGER NOT NULL DEFAULT 22
);

CREATE TABLE IF NOT EXISTS data_centers (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    user_name TEXT NOT NULL,
    ssh_identity TEXT NOT NULL,
    machines TEXT NOT NULL,
    title TEXT NOT NULL,
    ssh_port INTEGER NOT NULL DEFAULT 22
);

CREATE TABLE IF NOT EXISTS clusters (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    cluster_type TEXT NOT NULL,
    clusterable_id INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS jmeter_plans (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    test_plan_name TEXT NOT NULL,
    content_hash TEXT NOT NULL,
    active INTEGER NOT NULL DEFAULT 0,
    properties TEXT NOT NULL DEFAULT '{}',
    latest_threads_count INTEGER NOT NULL DEFAULT 0,
    UNIQUE (project_id, test_plan_name)
);

CREATE TABLE IF NOT EXISTS load_agents (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    clusterable_id INTEGER NOT NULL,
    clusterable_type TEXT NOT NULL,
    jmeter_plan_id INTEGER NOT NULL REFERENCES jmeter_plans(id) ON DELETE CASCADE,
    public_ip_address TEXT,
    private_ip_address TEXT,
    active INTEGER NOT NULL DEFAULT 1,
    type TEXT NOT NULL,
    jmeter_pid INTEGER,
    identifier TEXT
);

CREATE TABLE IF NOT EXISTS target_hosts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    host_name TEXT NOT NULL,
    project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    type TEXT NOT NULL,
    role_name TEXT NOT NULL,
    executable_path TEXT,
    executable_pid INTEGER,
    ssh_identity TEXT,
    user_name TEXT,
    sampling_interval INTEGER NOT NULL DEFAULT 10,
    active INTEGER NOT NULL DEFAULT 0,
    UNIQUE (project_id, host_name, role_name)
);

CREATE TABLE IF NOT EXISTS execution_cycles (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    status TEXT NOT NULL DEFAULT 'started',
    started_at TEXT NOT NULL,
    stopped_at TEXT,
    threads_count INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS client_stats (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    execution_cycle_id INTEGER NOT NULL REFERENCES execution_cycles(id) ON DELETE CASCADE,
    jmeter_plan_id INTEGER NOT NULL,
    clusterable_id INTEGER NOT NULL,
    clusterable_type TEXT NOT NULL,
    threads_count INTEGER NOT NULL,
    aggregate_ninety_percentile REAL,
    aggregate_response_throughput REAL,
    last_sample_at TEXT
);

CREATE TABLE IF NOT EXISTS page_stats (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    client_stat_id INTEGER NOT NULL REFERENCES client_stats(id) ON DELETE CASCADE,
    page_label TEXT NOT NULL,
    samples_count INTEGER NOT NULL,
    average_response_time REAL NOT NULL,
    median_response_time REAL NOT NULL,
    ninety_percentile_response_time REAL NOT NULL,
    minimum_response_time INTEGER NOT NULL,
    maximum_response_time INTEGER NOT NULL,
    percentage_errors REAL NOT NULL,
    response_throughput REAL NOT NULL,
    size_throughput REAL NOT NULL,
    standard_deviation REAL NOT NULL,
    samples_breakup_json TEXT NOT NULL DEFAULT '{}'
);

CREATE TABLE IF NOT EXISTS target_stats (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    execution_cycle_id INTEGER NOT NULL REFERENCES execution_cycles(id) ON DELETE CASCADE,
    target_host_id INTEGER NOT NULL REFERENCES target_hosts(id) ON DELETE CASCADE,
    average_cpu_usage REAL NOT NULL,
    average_memory_usage REAL NOT NULL,
    average_swap_usage REAL,
    cpu_usage_trend BLOB,
    memory_usage_trend BLOB,
    swap_usage_trend BLOB
);
";
