use crate::models::common::{decimal_column, opt_decimal_column};
use chrono::{DateTime, NaiveDateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row};
use utoipa::ToSchema;

/// 锦标赛状态。预期的流转为
/// DRAFT -> PUBLISHED -> REGISTRATION_OPEN -> REGISTRATION_CLOSED -> IN_PROGRESS -> COMPLETED,
/// CANCELLED 可从任意非终态进入; update_status 不强制该图 (开放 setter)。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub enum TournamentStatus {
    #[serde(rename = "DRAFT")]
    Draft,
    #[serde(rename = "PUBLISHED")]
    Published,
    #[serde(rename = "REGISTRATION_OPEN")]
    RegistrationOpen,
    #[serde(rename = "REGISTRATION_CLOSED")]
    RegistrationClosed,
    #[serde(rename = "IN_PROGRESS")]
    InProgress,
    #[serde(rename = "COMPLETED")]
    Completed,
    #[serde(rename = "CANCELLED")]
    Cancelled,
}

impl TournamentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TournamentStatus::Draft => "DRAFT",
            TournamentStatus::Published => "PUBLISHED",
            TournamentStatus::RegistrationOpen => "REGISTRATION_OPEN",
            TournamentStatus::RegistrationClosed => "REGISTRATION_CLOSED",
            TournamentStatus::InProgress => "IN_PROGRESS",
            TournamentStatus::Completed => "COMPLETED",
            TournamentStatus::Cancelled => "CANCELLED",
        }
    }
}

impl std::fmt::Display for TournamentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TournamentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DRAFT" => Ok(TournamentStatus::Draft),
            "PUBLISHED" => Ok(TournamentStatus::Published),
            "REGISTRATION_OPEN" => Ok(TournamentStatus::RegistrationOpen),
            "REGISTRATION_CLOSED" => Ok(TournamentStatus::RegistrationClosed),
            "IN_PROGRESS" => Ok(TournamentStatus::InProgress),
            "COMPLETED" => Ok(TournamentStatus::Completed),
            "CANCELLED" => Ok(TournamentStatus::Cancelled),
            other => Err(format!("unknown tournament status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Tournament {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub category_id: i64,
    pub game_type_id: i64,
    pub organizer_id: i64,
    pub is_free: bool,
    pub price: Decimal,
    pub max_participants: i64,
    pub current_participants: i64,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub status: TournamentStatus,
    pub commission_percentage: Option<Decimal>,
    pub created_at: Option<NaiveDateTime>,
    pub updated_at: Option<NaiveDateTime>,
}

impl Tournament {
    /// 报名是否开放: 状态为 REGISTRATION_OPEN 且未满员且未开赛
    pub fn is_registration_open(&self, now: DateTime<Utc>) -> bool {
        self.status == TournamentStatus::RegistrationOpen
            && self.current_participants < self.max_participants
            && now < self.start_date
    }

    /// 是否正在进行中
    pub fn is_in_progress(&self, now: DateTime<Utc>) -> bool {
        self.status == TournamentStatus::InProgress
            && now >= self.start_date
            && now < self.end_date
    }

    pub fn is_full(&self) -> bool {
        self.current_participants >= self.max_participants
    }

    pub fn available_slots(&self) -> i64 {
        self.max_participants - self.current_participants
    }

    /// 防御性钳制: 满员时为 no-op, 调用方必须先检查 is_full
    pub fn increment_participants(&mut self) {
        if self.current_participants < self.max_participants {
            self.current_participants += 1;
        }
    }

    pub fn decrement_participants(&mut self) {
        if self.current_participants > 0 {
            self.current_participants -= 1;
        }
    }

    /// 按本锦标赛的抽成比例计算服务费, 四舍五入(half-up)保留两位小数
    pub fn calculate_commission(&self, ticket_price: Decimal) -> Decimal {
        match self.commission_percentage {
            Some(percentage) => (ticket_price * percentage / Decimal::ONE_HUNDRED)
                .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero),
            None => Decimal::ZERO,
        }
    }
}

impl FromRow<'_, SqliteRow> for Tournament {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        let status_raw: String = row.try_get("status")?;
        let status = status_raw
            .parse::<TournamentStatus>()
            .map_err(|e| sqlx::Error::ColumnDecode {
                index: "status".to_string(),
                source: e.into(),
            })?;

        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            category_id: row.try_get("category_id")?,
            game_type_id: row.try_get("game_type_id")?,
            organizer_id: row.try_get("organizer_id")?,
            is_free: row.try_get("is_free")?,
            price: decimal_column(row, "price")?,
            max_participants: row.try_get("max_participants")?,
            current_participants: row.try_get("current_participants")?,
            start_date: row.try_get("start_date")?,
            end_date: row.try_get("end_date")?,
            status,
            commission_percentage: opt_decimal_column(row, "commission_percentage")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CreateTournamentRequest {
    #[schema(example = "Summer CS2 Cup")]
    pub name: String,
    pub description: Option<String>,
    pub category_id: i64,
    pub game_type_id: i64,
    pub organizer_id: i64,
    pub is_free: bool,
    #[schema(value_type = Option<String>, example = "25.00")]
    pub price: Option<Decimal>,
    #[schema(example = 32)]
    pub max_participants: i64,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    #[schema(value_type = Option<String>, example = "5.0")]
    pub commission_percentage: Option<Decimal>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UpdateStatusRequest {
    #[schema(example = "REGISTRATION_OPEN")]
    pub status: TournamentStatus,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TournamentResponse {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub category_id: i64,
    pub game_type_id: i64,
    pub organizer_id: i64,
    pub is_free: bool,
    #[schema(value_type = String)]
    pub price: Decimal,
    pub max_participants: i64,
    pub current_participants: i64,
    pub available_slots: i64,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub status: TournamentStatus,
    #[schema(value_type = Option<String>)]
    pub commission_percentage: Option<Decimal>,
}

impl From<Tournament> for TournamentResponse {
    fn from(t: Tournament) -> Self {
        let available_slots = t.available_slots();
        Self {
            id: t.id,
            name: t.name,
            description: t.description,
            category_id: t.category_id,
            game_type_id: t.game_type_id,
            organizer_id: t.organizer_id,
            is_free: t.is_free,
            price: t.price,
            max_participants: t.max_participants,
            current_participants: t.current_participants,
            available_slots,
            start_date: t.start_date,
            end_date: t.end_date,
            status: t.status,
            commission_percentage: t.commission_percentage,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::str::FromStr;

    fn sample(status: TournamentStatus, current: i64, max: i64) -> Tournament {
        let now = Utc::now();
        Tournament {
            id: 1,
            name: "Test Cup".to_string(),
            description: None,
            category_id: 1,
            game_type_id: 1,
            organizer_id: 1,
            is_free: false,
            price: Decimal::new(2500, 2),
            max_participants: max,
            current_participants: current,
            start_date: now + Duration::hours(1),
            end_date: now + Duration::hours(5),
            status,
            commission_percentage: Some(Decimal::new(100, 1)), // 10.0
            created_at: None,
            updated_at: None,
        }
    }

    #[test]
    fn test_registration_open() {
        let now = Utc::now();
        let t = sample(TournamentStatus::RegistrationOpen, 0, 8);
        assert!(t.is_registration_open(now));

        // 已满员
        let full = sample(TournamentStatus::RegistrationOpen, 8, 8);
        assert!(!full.is_registration_open(now));

        // 已开赛
        let mut started = sample(TournamentStatus::RegistrationOpen, 0, 8);
        started.start_date = now - Duration::minutes(1);
        assert!(!started.is_registration_open(now));

        // 状态不符
        let draft = sample(TournamentStatus::Draft, 0, 8);
        assert!(!draft.is_registration_open(now));
    }

    #[test]
    fn test_in_progress_window() {
        let now = Utc::now();
        let mut t = sample(TournamentStatus::InProgress, 4, 8);
        t.start_date = now - Duration::hours(1);
        t.end_date = now + Duration::hours(1);
        assert!(t.is_in_progress(now));

        // 已结束
        assert!(!t.is_in_progress(now + Duration::hours(2)));
        // 未开始
        assert!(!t.is_in_progress(now - Duration::hours(2)));
        // 开赛瞬间算进行中
        assert!(t.is_in_progress(t.start_date));

        t.status = TournamentStatus::RegistrationOpen;
        assert!(!t.is_in_progress(now));
    }

    #[test]
    fn test_counter_clamps() {
        let mut t = sample(TournamentStatus::RegistrationOpen, 7, 8);
        t.increment_participants();
        assert_eq!(t.current_participants, 8);
        // 满员后 no-op
        t.increment_participants();
        assert_eq!(t.current_participants, 8);

        let mut empty = sample(TournamentStatus::RegistrationOpen, 1, 8);
        empty.decrement_participants();
        assert_eq!(empty.current_participants, 0);
        // 零之下 no-op
        empty.decrement_participants();
        assert_eq!(empty.current_participants, 0);
    }

    #[test]
    fn test_commission_rounding_half_up() {
        let t = sample(TournamentStatus::RegistrationOpen, 0, 8);

        // 33.335 * 10% = 3.3335 -> 3.33
        let fee = t.calculate_commission(Decimal::from_str("33.335").unwrap());
        assert_eq!(fee, Decimal::from_str("3.33").unwrap());

        // 10.05 * 10% = 1.005 -> 中点进位 1.01
        let fee = t.calculate_commission(Decimal::from_str("10.05").unwrap());
        assert_eq!(fee, Decimal::from_str("1.01").unwrap());

        // 无抽成比例 -> 0
        let mut none = sample(TournamentStatus::RegistrationOpen, 0, 8);
        none.commission_percentage = None;
        assert_eq!(
            none.calculate_commission(Decimal::from_str("100").unwrap()),
            Decimal::ZERO
        );
    }

    #[test]
    fn test_status_parse_roundtrip() {
        for s in [
            TournamentStatus::Draft,
            TournamentStatus::Published,
            TournamentStatus::RegistrationOpen,
            TournamentStatus::RegistrationClosed,
            TournamentStatus::InProgress,
            TournamentStatus::Completed,
            TournamentStatus::Cancelled,
        ] {
            assert_eq!(s.as_str().parse::<TournamentStatus>().unwrap(), s);
        }
        assert!("OPEN".parse::<TournamentStatus>().is_err());
    }
}
