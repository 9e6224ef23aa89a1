use anyhow::Result;
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use uuid::Uuid;

use crate::bank_store::{BankError, BankStore, EnrollmentService, HistoryStore};
use crate::models::{AnsweredRecord, Candidate, QuestionSource, SubtopicAllowlist};

/// The three bank collections, each stored in its own table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BankCollection {
    Class,
    Personal,
    Shared,
}

impl BankCollection {
    fn table(&self) -> &'static str {
        match self {
            BankCollection::Class => "class_questions",
            BankCollection::Personal => "personal_questions",
            BankCollection::Shared => "shared_questions",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "class" => Some(BankCollection::Class),
            "personal" => Some(BankCollection::Personal),
            "shared" => Some(BankCollection::Shared),
            _ => None,
        }
    }
}

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn new(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);

        // Every connection to an in-memory database sees its own copy, so keep one.
        let pool = if database_url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(options)
                .await?
        } else {
            SqlitePoolOptions::new().connect_with(options).await?
        };

        let db = Database { pool };
        db.migrate().await?;
        Ok(db)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS answered_records (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL,
                topic TEXT NOT NULL,
                question TEXT NOT NULL,
                correct_answer TEXT NOT NULL,
                is_correct INTEGER NOT NULL,
                timestamp TEXT NOT NULL,
                time_taken_seconds REAL NOT NULL DEFAULT 0.0,
                subtopic TEXT
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS answered_bank_ids (
                user_id TEXT NOT NULL,
                question_id TEXT NOT NULL,
                PRIMARY KEY (user_id, question_id)
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        for collection in [BankCollection::Class, BankCollection::Personal, BankCollection::Shared] {
            sqlx::query(&format!(
                r#"
                CREATE TABLE IF NOT EXISTS {table} (
                    question_id TEXT PRIMARY KEY,
                    owner_id TEXT,
                    topic TEXT NOT NULL,
                    grade INTEGER NOT NULL,
                    question TEXT NOT NULL,
                    options TEXT,
                    correct_answer TEXT NOT NULL,
                    concept TEXT,
                    subtopic TEXT,
                    difficulty REAL
                );
                "#,
                table = collection.table()
            ))
            .execute(&self.pool)
            .await?;

            sqlx::query(&format!(
                "CREATE INDEX IF NOT EXISTS idx_{table}_lookup ON {table} (topic, grade, owner_id)",
                table = collection.table()
            ))
            .execute(&self.pool)
            .await?;
        }

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS enrollments (
                user_id TEXT PRIMARY KEY,
                class_id TEXT,
                subtopic_allowlist TEXT
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS class_settings (
                class_id TEXT PRIMARY KEY,
                bank_probability REAL NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // History operations
    pub async fn record_answer(&self, user_id: &str, record: &AnsweredRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO answered_records (user_id, topic, question, correct_answer, is_correct,
                                          timestamp, time_taken_seconds, subtopic)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(user_id)
        .bind(&record.topic)
        .bind(&record.question)
        .bind(&record.correct_answer)
        .bind(record.is_correct)
        .bind(&record.timestamp)
        .bind(record.time_taken_seconds)
        .bind(&record.subtopic)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn record_bank_answer(&self, user_id: &str, question_id: &str) -> Result<()> {
        sqlx::query("INSERT OR IGNORE INTO answered_bank_ids (user_id, question_id) VALUES (?1, ?2)")
            .bind(user_id)
            .bind(question_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // Bank operations
    pub async fn insert_bank_question(
        &self,
        collection: BankCollection,
        owner_id: Option<&str>,
        grade: u8,
        candidate: &Candidate,
    ) -> Result<String> {
        let question_id = candidate
            .question_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let options_json = candidate.options.as_ref().map(serde_json::to_string).transpose()?;

        sqlx::query(&format!(
            r#"
            INSERT OR REPLACE INTO {} (question_id, owner_id, topic, grade, question, options,
                                       correct_answer, concept, subtopic, difficulty)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
            collection.table()
        ))
        .bind(&question_id)
        .bind(owner_id)
        .bind(&candidate.topic)
        .bind(grade as i64)
        .bind(&candidate.question)
        .bind(options_json)
        .bind(&candidate.correct_answer)
        .bind(&candidate.concept)
        .bind(&candidate.subtopic)
        .bind(candidate.difficulty)
        .execute(&self.pool)
        .await?;

        Ok(question_id)
    }

    pub async fn query_bank(
        &self,
        collection: BankCollection,
        owner_id: Option<&str>,
        topic: &str,
        grade: u8,
    ) -> std::result::Result<Vec<Candidate>, sqlx::Error> {
        let rows = match owner_id {
            Some(owner) => {
                sqlx::query(&format!(
                    "SELECT * FROM {} WHERE topic = ?1 AND grade = ?2 AND owner_id = ?3 ORDER BY question_id",
                    collection.table()
                ))
                .bind(topic)
                .bind(grade as i64)
                .bind(owner)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(&format!(
                    "SELECT * FROM {} WHERE topic = ?1 AND grade = ?2 ORDER BY question_id",
                    collection.table()
                ))
                .bind(topic)
                .bind(grade as i64)
                .fetch_all(&self.pool)
                .await?
            }
        };

        let source = match collection {
            BankCollection::Shared => QuestionSource::SharedQuestionBank,
            _ => QuestionSource::QuestionBank,
        };
        Ok(rows.iter().map(|row| row_to_candidate(row, source)).collect())
    }

    // Enrollment operations
    pub async fn set_enrollment(
        &self,
        user_id: &str,
        class_id: Option<&str>,
        allowlist: Option<&SubtopicAllowlist>,
    ) -> Result<()> {
        let allowlist_json = allowlist.map(serde_json::to_string).transpose()?;
        sqlx::query(
            r#"
            INSERT INTO enrollments (user_id, class_id, subtopic_allowlist) VALUES (?1, ?2, ?3)
            ON CONFLICT(user_id) DO UPDATE SET class_id = excluded.class_id,
                                               subtopic_allowlist = excluded.subtopic_allowlist
            "#,
        )
        .bind(user_id)
        .bind(class_id)
        .bind(allowlist_json)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn set_bank_probability(&self, class_id: &str, probability: f64) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO class_settings (class_id, bank_probability) VALUES (?1, ?2)
            ON CONFLICT(class_id) DO UPDATE SET bank_probability = excluded.bank_probability
            "#,
        )
        .bind(class_id)
        .bind(probability)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

fn row_to_candidate(row: &SqliteRow, source: QuestionSource) -> Candidate {
    let options = row
        .get::<Option<String>, _>("options")
        .and_then(|json| serde_json::from_str::<Vec<String>>(&json).ok());

    Candidate {
        question: row.get("question"),
        options,
        correct_answer: row.get("correct_answer"),
        topic: row.get("topic"),
        concept: row.get("concept"),
        subtopic: row.get("subtopic"),
        question_id: Some(row.get("question_id")),
        source,
        difficulty: row.get("difficulty"),
    }
}

#[async_trait]
impl HistoryStore for Database {
    async fn load_answered_history(&self, user_id: &str) -> Result<Vec<AnsweredRecord>> {
        let rows = sqlx::query("SELECT * FROM answered_records WHERE user_id = ?1 ORDER BY id")
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .iter()
            .map(|row| AnsweredRecord {
                topic: row.get("topic"),
                question: row.get("question"),
                correct_answer: row.get("correct_answer"),
                is_correct: row.get("is_correct"),
                timestamp: row.get("timestamp"),
                time_taken_seconds: row.get("time_taken_seconds"),
                subtopic: row.get("subtopic"),
            })
            .collect())
    }

    async fn load_answered_bank_ids(&self, user_id: &str) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT question_id FROM answered_bank_ids WHERE user_id = ?1")
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(|row| row.get("question_id")).collect())
    }
}

#[async_trait]
impl EnrollmentService for Database {
    async fn subtopic_allowlist_for(&self, user_id: &str) -> Result<SubtopicAllowlist> {
        let row = sqlx::query("SELECT subtopic_allowlist FROM enrollments WHERE user_id = ?1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        let Some(json) = row.and_then(|row| row.get::<Option<String>, _>("subtopic_allowlist")) else {
            return Ok(SubtopicAllowlist::new());
        };
        Ok(serde_json::from_str(&json)?)
    }

    async fn bank_sample_probability_for(&self, class_id: &str) -> Result<Option<f64>> {
        let row = sqlx::query("SELECT bank_probability FROM class_settings WHERE class_id = ?1")
            .bind(class_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|row| row.get("bank_probability")))
    }
}

/// One bank collection served from SQLite.
#[derive(Clone)]
pub struct SqliteBankStore {
    db: Database,
    collection: BankCollection,
}

impl SqliteBankStore {
    pub fn new(db: Database, collection: BankCollection) -> Self {
        Self { db, collection }
    }
}

#[async_trait]
impl BankStore for SqliteBankStore {
    async fn query(&self, owner: Option<&str>, topic: &str, grade: u8) -> std::result::Result<Vec<Candidate>, BankError> {
        self.db
            .query_bank(self.collection, owner, topic, grade)
            .await
            .map_err(|e| classify_sqlx_error(&e))
    }
}

/// Map sqlx failures onto the bank error taxonomy.
pub fn classify_sqlx_error(error: &sqlx::Error) -> BankError {
    match error {
        sqlx::Error::Database(db_error) => {
            let message = db_error.message().to_string();
            let lowered = message.to_lowercase();
            if lowered.contains("no such table") || lowered.contains("no such index") {
                BankError::missing_index(message)
            } else if lowered.contains("locked") || lowered.contains("busy") {
                BankError::transient("resource-exhausted", message)
            } else {
                BankError::permanent("internal", message)
            }
        }
        sqlx::Error::PoolTimedOut => BankError::transient("deadline-exceeded", error.to_string()),
        sqlx::Error::Io(_) | sqlx::Error::PoolClosed | sqlx::Error::WorkerCrashed => {
            BankError::transient("unavailable", error.to_string())
        }
        _ => BankError::permanent("internal", error.to_string()),
    }
}
