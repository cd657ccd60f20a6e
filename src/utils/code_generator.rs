use crate::error::{AppError, AppResult};
use rand::Rng;
use sqlx::SqlitePool;

/// 碰撞重试上限, 超过则返回 CodeGenerationExhausted
const MAX_CODE_ATTEMPTS: u32 = 20;

const HEX_CHARS: &[u8] = b"0123456789ABCDEF";

fn random_hex(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| HEX_CHARS[rng.gen_range(0..HEX_CHARS.len())] as char)
        .collect()
}

/// 生成一个 QR 码候选值: "TICKET-" + 16 位大写十六进制
pub fn qr_code_candidate() -> String {
    format!("TICKET-{}", random_hex(16))
}

/// 生成一个唯一码候选值: "TM-" + 12 位大写十六进制
pub fn unique_code_candidate() -> String {
    format!("TM-{}", random_hex(12))
}

/// 生成全局唯一的 QR 码 (生成候选 -> 查库 -> 冲突则重试)
pub async fn generate_unique_qr_code(pool: &SqlitePool) -> AppResult<String> {
    for _ in 0..MAX_CODE_ATTEMPTS {
        let code = qr_code_candidate();

        let exists = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM tickets WHERE qr_code = ?",
        )
        .bind(&code)
        .fetch_one(pool)
        .await?;

        if exists == 0 {
            return Ok(code);
        }
    }

    Err(AppError::CodeGenerationExhausted("QR"))
}

/// 生成全局唯一的门票唯一码
pub async fn generate_unique_ticket_code(pool: &SqlitePool) -> AppResult<String> {
    for _ in 0..MAX_CODE_ATTEMPTS {
        let code = unique_code_candidate();

        let exists = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM tickets WHERE unique_code = ?",
        )
        .bind(&code)
        .fetch_one(pool)
        .await?;

        if exists == 0 {
            return Ok(code);
        }
    }

    Err(AppError::CodeGenerationExhausted("unique"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qr_code_candidate_format() {
        let code = qr_code_candidate();
        assert!(code.starts_with("TICKET-"));
        let suffix = &code["TICKET-".len()..];
        assert_eq!(suffix.len(), 16);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit() && !c.is_lowercase()));
    }

    #[test]
    fn test_unique_code_candidate_format() {
        let code = unique_code_candidate();
        assert!(code.starts_with("TM-"));
        let suffix = &code["TM-".len()..];
        assert_eq!(suffix.len(), 12);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit() && !c.is_lowercase()));
    }

    #[test]
    fn test_candidates_are_random() {
        // 理论上可能相同, 但 64 位随机空间下概率可忽略
        let a = qr_code_candidate();
        let b = qr_code_candidate();
        assert_ne!(a, b);
    }
}
