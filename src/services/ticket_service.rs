use crate::error::{is_unique_violation, AppError, AppResult};
use crate::external::{render_qr_data_url, NotificationEventType, NotificationService};
use crate::models::*;
use crate::utils::{generate_unique_qr_code, generate_unique_ticket_code};
use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::json;
use sqlx::SqlitePool;

#[derive(Clone)]
pub struct TicketService {
    pool: SqlitePool,
    notification_service: NotificationService,
}

impl TicketService {
    pub fn new(pool: SqlitePool, notification_service: NotificationService) -> Self {
        Self {
            pool,
            notification_service,
        }
    }

    /// 购票。业务校验全部通过后, 名额占用与门票写入在同一事务中完成:
    /// 名额通过条件 UPDATE 原子占用 (满员时影响 0 行), (user, tournament)
    /// 唯一索引兜底并发重复购票。
    pub async fn create_ticket(&self, user_id: i64, tournament_id: i64) -> AppResult<Ticket> {
        log::info!("Creating ticket for user {user_id} in tournament {tournament_id}");
        let now = Utc::now();

        let user = self.get_user(user_id).await?;

        let tournament = sqlx::query_as::<_, Tournament>("SELECT * FROM tournaments WHERE id = ?")
            .bind(tournament_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound("Tournament not found".to_string()))?;

        if !tournament.is_registration_open(now) {
            return Err(AppError::TournamentNotOpen);
        }

        if tournament.is_full() {
            return Err(AppError::TournamentFull);
        }

        // 任何历史门票都阻止重复购票, 与状态无关
        let existing = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM tickets WHERE user_id = ? AND tournament_id = ?",
        )
        .bind(user_id)
        .bind(tournament_id)
        .fetch_one(&self.pool)
        .await?;
        if existing > 0 {
            return Err(AppError::DuplicateTicket);
        }

        let qr_code = generate_unique_qr_code(&self.pool).await?;
        let unique_code = generate_unique_ticket_code(&self.pool).await?;

        let price = if tournament.is_free {
            Decimal::ZERO
        } else {
            tournament.price
        };
        let service_fee = tournament.calculate_commission(price);
        let total_amount = price + service_fee;

        let mut tx = self.pool.begin().await?;

        // 原子占位: 读检查与自增为一条语句, 并发下只有占到名额的请求能通过
        let claimed = sqlx::query(
            r#"
            UPDATE tournaments
            SET current_participants = current_participants + 1,
                updated_at = datetime('now')
            WHERE id = ? AND current_participants < max_participants
            "#,
        )
        .bind(tournament_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if claimed == 0 {
            return Err(AppError::TournamentFull);
        }

        let ticket_id = sqlx::query(
            r#"
            INSERT INTO tickets (
                user_id, tournament_id, qr_code, unique_code, purchase_date,
                price, service_fee, total_amount, status
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(user_id)
        .bind(tournament_id)
        .bind(&qr_code)
        .bind(&unique_code)
        .bind(now)
        .bind(price.to_string())
        .bind(service_fee.to_string())
        .bind(total_amount.to_string())
        .bind(TicketStatus::Active.as_str())
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::DuplicateTicket
            } else {
                AppError::DatabaseError(e)
            }
        })?
        .last_insert_rowid();

        tx.commit().await?;

        let ticket = self
            .get_ticket_by_id(ticket_id)
            .await?
            .ok_or_else(|| AppError::InternalError("Ticket vanished after insert".to_string()))?;

        log::info!("Ticket created: {ticket_id}");

        self.notification_service.notify(
            &user,
            NotificationEventType::TicketPurchased,
            &format!("Ticket purchased for tournament '{}'", tournament.name),
            json!({ "tournamentId": tournament_id, "ticketId": ticket_id }),
        );

        Ok(ticket)
    }

    /// 取消门票。只有取消前处于 ACTIVE 的门票才释放名额,
    /// 重复取消对计数器是 no-op。
    pub async fn cancel_ticket(&self, ticket_id: i64) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;

        let ticket = sqlx::query_as::<_, Ticket>("SELECT * FROM tickets WHERE id = ?")
            .bind(ticket_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::NotFound("Ticket not found".to_string()))?;

        if ticket.status == TicketStatus::Used {
            return Err(AppError::TicketAlreadyUsed);
        }

        // 变更前记录是否 ACTIVE
        let was_active = ticket.is_active();

        sqlx::query("UPDATE tickets SET status = ? WHERE id = ?")
            .bind(TicketStatus::Cancelled.as_str())
            .bind(ticket_id)
            .execute(&mut *tx)
            .await?;

        if was_active {
            sqlx::query(
                r#"
                UPDATE tournaments
                SET current_participants = current_participants - 1,
                    updated_at = datetime('now')
                WHERE id = ? AND current_participants > 0
                "#,
            )
            .bind(ticket.tournament_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        log::info!("Ticket cancelled: {ticket_id}");

        if let Ok(user) = self.get_user(ticket.user_id).await {
            self.notification_service.notify(
                &user,
                NotificationEventType::TicketCancelled,
                "Your ticket has been cancelled",
                json!({ "tournamentId": ticket.tournament_id, "ticketId": ticket_id }),
            );
        }

        Ok(())
    }

    /// 闸机核销。未知或无效的码是常规结果而非错误, 返回 false;
    /// 核销本身是条件 UPDATE (status = ACTIVE 时才生效), 保证至多一次。
    pub async fn validate_and_use_ticket(&self, qr_code: &str) -> AppResult<bool> {
        let now = Utc::now();

        let Some(ticket) = self.get_ticket_by_qr_code(qr_code).await? else {
            log::warn!("Ticket not found for QR code: {qr_code}");
            return Ok(false);
        };

        let Some(tournament) =
            sqlx::query_as::<_, Tournament>("SELECT * FROM tournaments WHERE id = ?")
                .bind(ticket.tournament_id)
                .fetch_optional(&self.pool)
                .await?
        else {
            log::warn!("Tournament missing for ticket {}", ticket.id);
            return Ok(false);
        };

        if !ticket.is_valid(&tournament, now) {
            log::warn!("Ticket not valid: {}", ticket.id);
            return Ok(false);
        }

        let redeemed = sqlx::query(
            "UPDATE tickets SET status = ?, used_at = ? WHERE id = ? AND status = ?",
        )
        .bind(TicketStatus::Used.as_str())
        .bind(now)
        .bind(ticket.id)
        .bind(TicketStatus::Active.as_str())
        .execute(&self.pool)
        .await?
        .rows_affected();

        if redeemed == 0 {
            // 并发核销竞争失败
            log::warn!("Ticket {} was redeemed concurrently", ticket.id);
            return Ok(false);
        }

        log::info!("Ticket used: {}", ticket.id);

        if let Ok(user) = self.get_user(ticket.user_id).await {
            self.notification_service.notify(
                &user,
                NotificationEventType::TicketValidated,
                &format!("Ticket validated for tournament '{}'", tournament.name),
                json!({ "tournamentId": tournament.id, "ticketId": ticket.id }),
            );
        }

        Ok(true)
    }

    /// 过期原语。核心内没有调度器触发它, 仅作为外部触发的终态流转。
    /// 不回退参与者计数。
    pub async fn expire_ticket(&self, ticket_id: i64) -> AppResult<()> {
        let ticket = self
            .get_ticket_by_id(ticket_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Ticket not found".to_string()))?;

        if !ticket.is_active() {
            return Err(AppError::ValidationError(
                "Only an active ticket can be expired".to_string(),
            ));
        }

        sqlx::query("UPDATE tickets SET status = ? WHERE id = ? AND status = ?")
            .bind(TicketStatus::Expired.as_str())
            .bind(ticket_id)
            .bind(TicketStatus::Active.as_str())
            .execute(&self.pool)
            .await?;

        log::info!("Ticket expired: {ticket_id}");
        Ok(())
    }

    pub async fn get_ticket_by_id(&self, id: i64) -> AppResult<Option<Ticket>> {
        let ticket = sqlx::query_as::<_, Ticket>("SELECT * FROM tickets WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(ticket)
    }

    pub async fn get_ticket_by_qr_code(&self, qr_code: &str) -> AppResult<Option<Ticket>> {
        let ticket = sqlx::query_as::<_, Ticket>("SELECT * FROM tickets WHERE qr_code = ?")
            .bind(qr_code)
            .fetch_optional(&self.pool)
            .await?;
        Ok(ticket)
    }

    pub async fn get_ticket_by_unique_code(&self, unique_code: &str) -> AppResult<Option<Ticket>> {
        let ticket = sqlx::query_as::<_, Ticket>("SELECT * FROM tickets WHERE unique_code = ?")
            .bind(unique_code)
            .fetch_optional(&self.pool)
            .await?;
        Ok(ticket)
    }

    pub async fn get_tickets_by_user(&self, user_id: i64) -> AppResult<Vec<Ticket>> {
        let tickets = sqlx::query_as::<_, Ticket>(
            "SELECT * FROM tickets WHERE user_id = ? ORDER BY purchase_date DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(tickets)
    }

    pub async fn get_tickets_by_tournament(&self, tournament_id: i64) -> AppResult<Vec<Ticket>> {
        let tickets = sqlx::query_as::<_, Ticket>(
            "SELECT * FROM tickets WHERE tournament_id = ? ORDER BY purchase_date ASC",
        )
        .bind(tournament_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(tickets)
    }

    /// 门票二维码图片 (base64 data URL)
    pub async fn get_qr_image(&self, ticket_id: i64) -> AppResult<String> {
        let ticket = self
            .get_ticket_by_id(ticket_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Ticket not found".to_string()))?;

        render_qr_data_url(&ticket.qr_code)
    }

    async fn get_user(&self, id: i64) -> AppResult<User> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))
    }
}
