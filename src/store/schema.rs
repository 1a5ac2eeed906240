/// Idempotent schema, applied at startup
pub const SCHEMA: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS user_account (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        email TEXT NOT NULL UNIQUE,
        password TEXT NOT NULL,
        role INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL
    )"#,
    r#"CREATE TABLE IF NOT EXISTS roadmap (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER NOT NULL REFERENCES user_account(id) ON DELETE CASCADE,
        title TEXT NOT NULL,
        description TEXT NOT NULL,
        subject TEXT NOT NULL,
        difficulty TEXT NOT NULL,
        total_steps INTEGER NOT NULL,
        estimated_hours REAL NOT NULL,
        status INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )"#,
    r#"CREATE TABLE IF NOT EXISTS step (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        roadmap_id INTEGER NOT NULL REFERENCES roadmap(id) ON DELETE CASCADE,
        order_index INTEGER NOT NULL,
        title TEXT NOT NULL,
        description TEXT NOT NULL,
        step_type TEXT NOT NULL,
        difficulty TEXT NOT NULL,
        estimated_minutes INTEGER NOT NULL,
        mastery_threshold INTEGER NOT NULL DEFAULT 70,
        prerequisites TEXT NOT NULL DEFAULT '[]',
        resources TEXT NOT NULL DEFAULT '[]',
        current_score INTEGER,
        attempts INTEGER NOT NULL DEFAULT 0,
        status INTEGER NOT NULL,
        updated_at TEXT NOT NULL,
        UNIQUE (roadmap_id, order_index)
    )"#,
    r#"CREATE TABLE IF NOT EXISTS step_content (
        step_id INTEGER PRIMARY KEY REFERENCES step(id) ON DELETE CASCADE,
        content TEXT NOT NULL,
        created_at TEXT NOT NULL
    )"#,
    r#"CREATE TABLE IF NOT EXISTS step_assessment (
        step_id INTEGER PRIMARY KEY REFERENCES step(id) ON DELETE CASCADE,
        questions TEXT NOT NULL,
        source INTEGER NOT NULL,
        created_at TEXT NOT NULL
    )"#,
    r#"CREATE TABLE IF NOT EXISTS assessment_attempt (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER NOT NULL REFERENCES user_account(id) ON DELETE CASCADE,
        step_id INTEGER NOT NULL REFERENCES step(id) ON DELETE CASCADE,
        score INTEGER NOT NULL,
        passed INTEGER NOT NULL,
        answers TEXT NOT NULL,
        time_spent_secs INTEGER,
        attempt_number INTEGER NOT NULL,
        created_at TEXT NOT NULL,
        UNIQUE (user_id, step_id, attempt_number)
    )"#,
    r#"CREATE TABLE IF NOT EXISTS tutor_assignment (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        student_id INTEGER NOT NULL REFERENCES user_account(id) ON DELETE CASCADE,
        tutor_id INTEGER REFERENCES user_account(id) ON DELETE SET NULL,
        roadmap_id INTEGER NOT NULL REFERENCES roadmap(id) ON DELETE CASCADE,
        step_ids TEXT NOT NULL,
        reason TEXT NOT NULL,
        status INTEGER NOT NULL DEFAULT 0,
        session_count INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )"#,
    "CREATE INDEX IF NOT EXISTS idx_attempt_user_step ON assessment_attempt (user_id, step_id)",
    "CREATE INDEX IF NOT EXISTS idx_assignment_status ON tutor_assignment (status)",
];
