use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, sqlx::FromRow)]
pub struct SampleRow {
	pub key: String,
	pub prefix: String,
	pub position: Option<i64>,
	pub value: Value,
	pub updated_at: OffsetDateTime,
}

#[derive(Debug, sqlx::FromRow)]
pub struct StudyRow {
	pub study_id: Uuid,
	pub name: String,
	pub objectives: Value,
	pub created_at: OffsetDateTime,
}

#[derive(Debug, sqlx::FromRow)]
pub struct TrialRow {
	pub study_id: Uuid,
	pub number: i32,
	pub params: Value,
	pub scores: Value,
	pub status: String,
	pub error: Option<String>,
	pub created_at: OffsetDateTime,
}
