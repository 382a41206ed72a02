// ==========================================
// 车间执行追踪系统 - 标识与令牌生成
// ==========================================
// 检查点令牌: 128 位随机数 (UUID v4 去连字符), 不透明, 不可推测
// ==========================================

use uuid::Uuid;

/// 生成实体ID
pub fn new_entity_id() -> String {
    Uuid::new_v4().to_string()
}

/// 生成检查点令牌 (32 位十六进制)
pub fn new_checkpoint_token() -> String {
    Uuid::new_v4().simple().to_string()
}

/// 生成流转卡号
///
/// # 格式
/// `{prefix}-{order_no}-{NN}`, NN 为该订单第几张流转卡 (从 1 开始, 至少两位)
pub fn format_sheet_no(prefix: &str, order_no: &str, ordinal: u32) -> String {
    format!("{}-{}-{:02}", prefix, order_no, ordinal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_checkpoint_tokens_are_unique_and_opaque() {
        let tokens: HashSet<String> = (0..1000).map(|_| new_checkpoint_token()).collect();
        assert_eq!(tokens.len(), 1000);
        assert!(tokens.iter().all(|t| t.len() == 32 && !t.contains('-')));
    }

    #[test]
    fn test_sheet_no_format() {
        assert_eq!(format_sheet_no("TS", "MO-2026-001", 1), "TS-MO-2026-001-01");
        assert_eq!(format_sheet_no("TS", "A", 123), "TS-A-123");
    }
}
