use crate::models::common::decimal_column;
use crate::models::tournament::Tournament;
use chrono::{DateTime, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row};
use utoipa::ToSchema;

/// 门票状态。ACTIVE 为唯一非终态: 一旦转为 USED / CANCELLED / EXPIRED 均不可逆。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub enum TicketStatus {
    #[serde(rename = "ACTIVE")]
    Active,
    #[serde(rename = "USED")]
    Used,
    #[serde(rename = "CANCELLED")]
    Cancelled,
    #[serde(rename = "EXPIRED")]
    Expired,
}

impl TicketStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketStatus::Active => "ACTIVE",
            TicketStatus::Used => "USED",
            TicketStatus::Cancelled => "CANCELLED",
            TicketStatus::Expired => "EXPIRED",
        }
    }
}

impl std::fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TicketStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ACTIVE" => Ok(TicketStatus::Active),
            "USED" => Ok(TicketStatus::Used),
            "CANCELLED" => Ok(TicketStatus::Cancelled),
            "EXPIRED" => Ok(TicketStatus::Expired),
            other => Err(format!("unknown ticket status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Ticket {
    pub id: i64,
    pub user_id: i64,
    pub tournament_id: i64,
    pub qr_code: String,
    pub unique_code: String,
    pub purchase_date: DateTime<Utc>,
    #[schema(value_type = String)]
    pub price: Decimal,
    #[schema(value_type = String)]
    pub service_fee: Decimal,
    #[schema(value_type = String)]
    pub total_amount: Decimal,
    pub status: TicketStatus,
    pub used_at: Option<DateTime<Utc>>,
    pub created_at: Option<NaiveDateTime>,
}

impl Ticket {
    pub fn is_active(&self) -> bool {
        self.status == TicketStatus::Active
    }

    pub fn is_used(&self) -> bool {
        self.status == TicketStatus::Used && self.used_at.is_some()
    }

    pub fn mark_as_used(&mut self, now: DateTime<Utc>) {
        self.status = TicketStatus::Used;
        self.used_at = Some(now);
    }

    pub fn cancel(&mut self) {
        self.status = TicketStatus::Cancelled;
    }

    pub fn expire(&mut self) {
        self.status = TicketStatus::Expired;
    }

    pub fn calculate_total(&self) -> Decimal {
        self.price + self.service_fee
    }

    /// 核销校验: 门票处于 ACTIVE 且所属锦标赛正在进行中。
    /// is_used 子句在 is_active 成立时恒为假, 保留是沿用原有校验式。
    pub fn is_valid(&self, tournament: &Tournament, now: DateTime<Utc>) -> bool {
        self.is_active() && !self.is_used() && tournament.is_in_progress(now)
    }
}

impl FromRow<'_, SqliteRow> for Ticket {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        let status_raw: String = row.try_get("status")?;
        let status = status_raw
            .parse::<TicketStatus>()
            .map_err(|e| sqlx::Error::ColumnDecode {
                index: "status".to_string(),
                source: e.into(),
            })?;

        Ok(Self {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            tournament_id: row.try_get("tournament_id")?,
            qr_code: row.try_get("qr_code")?,
            unique_code: row.try_get("unique_code")?,
            purchase_date: row.try_get("purchase_date")?,
            price: decimal_column(row, "price")?,
            service_fee: decimal_column(row, "service_fee")?,
            total_amount: decimal_column(row, "total_amount")?,
            status,
            used_at: row.try_get("used_at")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CreateTicketRequest {
    pub tournament_id: i64,
    /// 缺省时使用当前登录用户
    pub user_id: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ValidateTicketRequest {
    #[schema(example = "TICKET-0123456789ABCDEF")]
    pub qr_code: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ValidateTicketResponse {
    pub valid: bool,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct QrImageResponse {
    /// data:image/png;base64,... 形式的二维码图片
    pub qr_image: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TicketResponse {
    pub id: i64,
    pub user_id: i64,
    pub tournament_id: i64,
    pub qr_code: String,
    pub unique_code: String,
    pub purchase_date: DateTime<Utc>,
    #[schema(value_type = String)]
    pub price: Decimal,
    #[schema(value_type = String)]
    pub service_fee: Decimal,
    #[schema(value_type = String)]
    pub total_amount: Decimal,
    pub status: TicketStatus,
    pub used_at: Option<DateTime<Utc>>,
}

impl From<Ticket> for TicketResponse {
    fn from(t: Ticket) -> Self {
        Self {
            id: t.id,
            user_id: t.user_id,
            tournament_id: t.tournament_id,
            qr_code: t.qr_code,
            unique_code: t.unique_code,
            purchase_date: t.purchase_date,
            price: t.price,
            service_fee: t.service_fee,
            total_amount: t.total_amount,
            status: t.status,
            used_at: t.used_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::tournament::TournamentStatus;
    use chrono::Duration;
    use std::str::FromStr;

    fn ticket(status: TicketStatus) -> Ticket {
        Ticket {
            id: 1,
            user_id: 1,
            tournament_id: 1,
            qr_code: "TICKET-0123456789ABCDEF".to_string(),
            unique_code: "TM-0123456789AB".to_string(),
            purchase_date: Utc::now(),
            price: Decimal::from_str("25.00").unwrap(),
            service_fee: Decimal::from_str("2.50").unwrap(),
            total_amount: Decimal::from_str("27.50").unwrap(),
            status,
            used_at: None,
            created_at: None,
        }
    }

    fn in_progress_tournament(now: DateTime<Utc>) -> Tournament {
        Tournament {
            id: 1,
            name: "Test Cup".to_string(),
            description: None,
            category_id: 1,
            game_type_id: 1,
            organizer_id: 1,
            is_free: false,
            price: Decimal::from_str("25.00").unwrap(),
            max_participants: 8,
            current_participants: 4,
            start_date: now - Duration::hours(1),
            end_date: now + Duration::hours(1),
            status: TournamentStatus::InProgress,
            commission_percentage: Some(Decimal::from_str("10").unwrap()),
            created_at: None,
            updated_at: None,
        }
    }

    #[test]
    fn test_mark_as_used() {
        let now = Utc::now();
        let mut t = ticket(TicketStatus::Active);
        assert!(t.is_active());
        assert!(!t.is_used());

        t.mark_as_used(now);
        assert_eq!(t.status, TicketStatus::Used);
        assert_eq!(t.used_at, Some(now));
        assert!(t.is_used());
    }

    #[test]
    fn test_is_valid_requires_active_and_in_progress() {
        let now = Utc::now();
        let tournament = in_progress_tournament(now);

        assert!(ticket(TicketStatus::Active).is_valid(&tournament, now));
        assert!(!ticket(TicketStatus::Cancelled).is_valid(&tournament, now));
        assert!(!ticket(TicketStatus::Expired).is_valid(&tournament, now));

        let mut used = ticket(TicketStatus::Used);
        used.used_at = Some(now);
        assert!(!used.is_valid(&tournament, now));

        // 锦标赛不在进行中
        let mut closed = in_progress_tournament(now);
        closed.status = TournamentStatus::RegistrationOpen;
        assert!(!ticket(TicketStatus::Active).is_valid(&closed, now));
    }

    #[test]
    fn test_calculate_total() {
        let t = ticket(TicketStatus::Active);
        assert_eq!(t.calculate_total(), Decimal::from_str("27.50").unwrap());
    }

    #[test]
    fn test_status_parse_roundtrip() {
        for s in [
            TicketStatus::Active,
            TicketStatus::Used,
            TicketStatus::Cancelled,
            TicketStatus::Expired,
        ] {
            assert_eq!(s.as_str().parse::<TicketStatus>().unwrap(), s);
        }
        assert!("VOID".parse::<TicketStatus>().is_err());
    }
}
