use crate::error::{AppError, AppResult};
use crate::external::{NotificationEventType, NotificationService};
use crate::models::*;
use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::json;
use sqlx::SqlitePool;

/// 每个组织者最多可创建的免费锦标赛数量
const MAX_FREE_TOURNAMENTS_PER_ORGANIZER: i64 = 2;

#[derive(Clone)]
pub struct TournamentService {
    pool: SqlitePool,
    notification_service: NotificationService,
}

impl TournamentService {
    pub fn new(pool: SqlitePool, notification_service: NotificationService) -> Self {
        Self {
            pool,
            notification_service,
        }
    }

    pub async fn create_tournament(
        &self,
        request: CreateTournamentRequest,
    ) -> AppResult<TournamentResponse> {
        log::info!("Creating tournament: {}", request.name);

        if request.name.trim().is_empty() {
            return Err(AppError::ValidationError(
                "Tournament name must not be empty".to_string(),
            ));
        }

        if request.max_participants < 2 {
            return Err(AppError::ValidationError(
                "Tournament needs at least 2 participants".to_string(),
            ));
        }

        if request.start_date >= request.end_date {
            return Err(AppError::ValidationError(
                "Start date must be before end date".to_string(),
            ));
        }

        let price = request.price.unwrap_or(Decimal::ZERO);
        if request.is_free && !price.is_zero() {
            return Err(AppError::ValidationError(
                "A free tournament must have price 0".to_string(),
            ));
        }
        if !request.is_free && price <= Decimal::ZERO {
            return Err(AppError::ValidationError(
                "A paid tournament must have a positive price".to_string(),
            ));
        }

        // 缺省抽成 5%
        let commission = request
            .commission_percentage
            .unwrap_or_else(|| Decimal::new(50, 1));
        if commission < Decimal::ZERO || commission > Decimal::ONE_HUNDRED {
            return Err(AppError::ValidationError(
                "Commission percentage must be between 0 and 100".to_string(),
            ));
        }

        // 校验关联实体存在
        let organizer = self.get_user(request.organizer_id).await?;

        let category_exists = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM categories WHERE id = ?",
        )
        .bind(request.category_id)
        .fetch_one(&self.pool)
        .await?;
        if category_exists == 0 {
            return Err(AppError::NotFound("Category not found".to_string()));
        }

        let game_type_exists = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM game_types WHERE id = ?",
        )
        .bind(request.game_type_id)
        .fetch_one(&self.pool)
        .await?;
        if game_type_exists == 0 {
            return Err(AppError::NotFound("Game type not found".to_string()));
        }

        // 免费锦标赛数量上限
        if request.is_free {
            let current = self
                .count_free_tournaments_by_organizer(organizer.id)
                .await?;
            if current >= MAX_FREE_TOURNAMENTS_PER_ORGANIZER {
                return Err(AppError::ValidationError(format!(
                    "Organizer already has {current} free tournaments (limit {MAX_FREE_TOURNAMENTS_PER_ORGANIZER})"
                )));
            }
        }

        let tournament_id = sqlx::query(
            r#"
            INSERT INTO tournaments (
                name, description, category_id, game_type_id, organizer_id,
                is_free, price, max_participants, current_participants,
                start_date, end_date, status, commission_percentage
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, 0, ?, ?, ?, ?)
            "#,
        )
        .bind(request.name.trim())
        .bind(&request.description)
        .bind(request.category_id)
        .bind(request.game_type_id)
        .bind(request.organizer_id)
        .bind(request.is_free)
        .bind(price.to_string())
        .bind(request.max_participants)
        .bind(request.start_date)
        .bind(request.end_date)
        .bind(TournamentStatus::Draft.as_str())
        .bind(commission.to_string())
        .execute(&self.pool)
        .await?
        .last_insert_rowid();

        log::info!("Tournament created: {tournament_id}");

        let tournament = self.get_tournament(tournament_id).await?;
        Ok(tournament.into())
    }

    pub async fn get_tournament_by_id(&self, id: i64) -> AppResult<TournamentResponse> {
        Ok(self.get_tournament(id).await?.into())
    }

    pub async fn get_all_tournaments(&self) -> AppResult<Vec<TournamentResponse>> {
        let tournaments = sqlx::query_as::<_, Tournament>(
            "SELECT * FROM tournaments ORDER BY start_date DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(tournaments.into_iter().map(Into::into).collect())
    }

    pub async fn get_tournaments_by_organizer(
        &self,
        organizer_id: i64,
    ) -> AppResult<Vec<TournamentResponse>> {
        let tournaments = sqlx::query_as::<_, Tournament>(
            "SELECT * FROM tournaments WHERE organizer_id = ? ORDER BY start_date DESC",
        )
        .bind(organizer_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(tournaments.into_iter().map(Into::into).collect())
    }

    /// 当前开放报名的锦标赛 (状态开放, 未满员, 未开赛)
    pub async fn get_open_tournaments(&self) -> AppResult<Vec<TournamentResponse>> {
        let now = Utc::now();
        let tournaments = sqlx::query_as::<_, Tournament>(
            r#"
            SELECT * FROM tournaments
            WHERE status = ? AND current_participants < max_participants AND start_date > ?
            ORDER BY start_date ASC
            "#,
        )
        .bind(TournamentStatus::RegistrationOpen.as_str())
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        Ok(tournaments.into_iter().map(Into::into).collect())
    }

    /// 状态更新。不校验流转图 (开放 setter), 任意状态可跟随任意状态。
    pub async fn update_tournament_status(
        &self,
        id: i64,
        status: TournamentStatus,
    ) -> AppResult<TournamentResponse> {
        let tournament = self.get_tournament(id).await?;

        sqlx::query("UPDATE tournaments SET status = ?, updated_at = datetime('now') WHERE id = ?")
            .bind(status.as_str())
            .bind(id)
            .execute(&self.pool)
            .await?;

        log::info!("Tournament {id} status updated to {status}");

        let updated = self.get_tournament(id).await?;

        // 状态变更通知组织者 (fire-and-forget)
        if let Ok(organizer) = self.get_user(tournament.organizer_id).await {
            let (event, message) = match status {
                TournamentStatus::InProgress => (
                    NotificationEventType::TournamentStart,
                    format!("Tournament '{}' has started", updated.name),
                ),
                TournamentStatus::Completed => (
                    NotificationEventType::TournamentEnd,
                    format!("Tournament '{}' has ended", updated.name),
                ),
                _ => (
                    NotificationEventType::TournamentUpdated,
                    format!("Tournament '{}' is now {}", updated.name, status),
                ),
            };
            self.notification_service.notify(
                &organizer,
                event,
                &message,
                json!({ "tournamentId": id, "status": status }),
            );
        }

        Ok(updated.into())
    }

    /// 参与者计数自增原语。读检查与写自增合并为一条条件 UPDATE,
    /// 满员时影响行数为 0, 返回 TournamentFull。
    pub async fn increment_participants(&self, id: i64) -> AppResult<()> {
        // 先区分 "不存在" 与 "已满"
        self.get_tournament(id).await?;

        let affected = sqlx::query(
            r#"
            UPDATE tournaments
            SET current_participants = current_participants + 1,
                updated_at = datetime('now')
            WHERE id = ? AND current_participants < max_participants
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if affected == 0 {
            return Err(AppError::TournamentFull);
        }

        log::info!("Participant added to tournament {id}");
        Ok(())
    }

    /// 参与者计数自减原语, 到 0 为止 (no-op 而非错误)
    pub async fn decrement_participants(&self, id: i64) -> AppResult<()> {
        self.get_tournament(id).await?;

        sqlx::query(
            r#"
            UPDATE tournaments
            SET current_participants = current_participants - 1,
                updated_at = datetime('now')
            WHERE id = ? AND current_participants > 0
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        log::info!("Participant removed from tournament {id}");
        Ok(())
    }

    pub async fn count_free_tournaments_by_organizer(&self, organizer_id: i64) -> AppResult<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM tournaments WHERE organizer_id = ? AND is_free = 1",
        )
        .bind(organizer_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    pub(crate) async fn get_tournament(&self, id: i64) -> AppResult<Tournament> {
        sqlx::query_as::<_, Tournament>("SELECT * FROM tournaments WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound("Tournament not found".to_string()))
    }

    async fn get_user(&self, id: i64) -> AppResult<User> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound("Organizer not found".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support::*;
    use chrono::Duration;

    fn service(pool: &SqlitePool) -> TournamentService {
        TournamentService::new(pool.clone(), test_notification_service())
    }

    fn create_request(organizer_id: i64) -> CreateTournamentRequest {
        let now = Utc::now();
        CreateTournamentRequest {
            name: "Summer CS2 Cup".to_string(),
            description: Some("Open qualifier".to_string()),
            category_id: 1,
            game_type_id: 1,
            organizer_id,
            is_free: false,
            price: Some("25.00".parse().unwrap()),
            max_participants: 16,
            start_date: now + Duration::days(1),
            end_date: now + Duration::days(2),
            commission_percentage: Some("10".parse().unwrap()),
        }
    }

    #[tokio::test]
    async fn test_create_tournament_defaults() {
        let pool = setup_pool().await;
        let organizer = seed_organizer(&pool, "org1").await;
        let svc = service(&pool);

        let created = svc.create_tournament(create_request(organizer)).await.unwrap();
        assert_eq!(created.status, TournamentStatus::Draft);
        assert_eq!(created.current_participants, 0);
        assert_eq!(created.available_slots, 16);
    }

    #[tokio::test]
    async fn test_create_tournament_validation() {
        let pool = setup_pool().await;
        let organizer = seed_organizer(&pool, "org1").await;
        let svc = service(&pool);

        let mut bad_dates = create_request(organizer);
        bad_dates.end_date = bad_dates.start_date - Duration::hours(1);
        assert!(matches!(
            svc.create_tournament(bad_dates).await,
            Err(AppError::ValidationError(_))
        ));

        let mut too_small = create_request(organizer);
        too_small.max_participants = 1;
        assert!(matches!(
            svc.create_tournament(too_small).await,
            Err(AppError::ValidationError(_))
        ));

        // 免费但带价格
        let mut free_with_price = create_request(organizer);
        free_with_price.is_free = true;
        assert!(matches!(
            svc.create_tournament(free_with_price).await,
            Err(AppError::ValidationError(_))
        ));

        // 付费但价格为 0
        let mut paid_without_price = create_request(organizer);
        paid_without_price.price = None;
        assert!(matches!(
            svc.create_tournament(paid_without_price).await,
            Err(AppError::ValidationError(_))
        ));

        let mut unknown_organizer = create_request(9999);
        unknown_organizer.organizer_id = 9999;
        assert!(matches!(
            svc.create_tournament(unknown_organizer).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_free_tournament_limit() {
        let pool = setup_pool().await;
        let organizer = seed_organizer(&pool, "org1").await;
        let svc = service(&pool);

        for i in 0..2 {
            let mut req = create_request(organizer);
            req.name = format!("Free Cup {i}");
            req.is_free = true;
            req.price = None;
            svc.create_tournament(req).await.unwrap();
        }

        let mut third = create_request(organizer);
        third.is_free = true;
        third.price = None;
        assert!(matches!(
            svc.create_tournament(third).await,
            Err(AppError::ValidationError(_))
        ));

        assert_eq!(
            svc.count_free_tournaments_by_organizer(organizer).await.unwrap(),
            2
        );
    }

    #[tokio::test]
    async fn test_increment_participants_stops_at_capacity() {
        let pool = setup_pool().await;
        let organizer = seed_organizer(&pool, "org1").await;
        let tournament = seed_tournament(&pool, organizer, "REGISTRATION_OPEN", 0, 2).await;
        let svc = service(&pool);

        svc.increment_participants(tournament).await.unwrap();
        svc.increment_participants(tournament).await.unwrap();
        assert!(matches!(
            svc.increment_participants(tournament).await,
            Err(AppError::TournamentFull)
        ));

        let t = svc.get_tournament(tournament).await.unwrap();
        assert_eq!(t.current_participants, 2);
    }

    #[tokio::test]
    async fn test_decrement_participants_clamps_at_zero() {
        let pool = setup_pool().await;
        let organizer = seed_organizer(&pool, "org1").await;
        let tournament = seed_tournament(&pool, organizer, "REGISTRATION_OPEN", 1, 8).await;
        let svc = service(&pool);

        svc.decrement_participants(tournament).await.unwrap();
        // 到 0 之后为 no-op
        svc.decrement_participants(tournament).await.unwrap();

        let t = svc.get_tournament(tournament).await.unwrap();
        assert_eq!(t.current_participants, 0);
    }

    #[tokio::test]
    async fn test_update_status_is_open_setter() {
        let pool = setup_pool().await;
        let organizer = seed_organizer(&pool, "org1").await;
        let tournament = seed_tournament(&pool, organizer, "DRAFT", 0, 8).await;
        let svc = service(&pool);

        // 不校验流转图: COMPLETED 之后仍可回到 REGISTRATION_OPEN
        let updated = svc
            .update_tournament_status(tournament, TournamentStatus::Completed)
            .await
            .unwrap();
        assert_eq!(updated.status, TournamentStatus::Completed);

        let updated = svc
            .update_tournament_status(tournament, TournamentStatus::RegistrationOpen)
            .await
            .unwrap();
        assert_eq!(updated.status, TournamentStatus::RegistrationOpen);
    }

    #[tokio::test]
    async fn test_open_tournaments_listing() {
        let pool = setup_pool().await;
        let organizer = seed_organizer(&pool, "org1").await;
        let open = seed_tournament(&pool, organizer, "REGISTRATION_OPEN", 0, 8).await;
        let full = seed_tournament(&pool, organizer, "REGISTRATION_OPEN", 8, 8).await;
        let draft = seed_tournament(&pool, organizer, "DRAFT", 0, 8).await;
        let svc = service(&pool);

        let listed = svc.get_open_tournaments().await.unwrap();
        let ids: Vec<i64> = listed.iter().map(|t| t.id).collect();
        assert!(ids.contains(&open));
        assert!(!ids.contains(&full));
        assert!(!ids.contains(&draft));
    }
}
