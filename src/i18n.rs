// ==========================================
// 国际化 (i18n) 模块
// ==========================================
// 使用 rust-i18n 库
// 支持中文（默认）和英文
// 用途: 面向操作员的提示语 (扫码枪终端 / 工位屏)
// ==========================================
// 注意: rust_i18n::i18n! 宏已在 lib.rs 中初始化
// ==========================================

/// 获取当前语言
pub fn current_locale() -> String {
    rust_i18n::locale().to_string()
}

/// 设置语言
///
/// # 参数
/// - locale: 语言代码（"zh-CN" 或 "en"）
pub fn set_locale(locale: &str) {
    rust_i18n::set_locale(locale);
}

/// 翻译消息（无参数, 当前语言）
///
/// # 示例
/// ```no_run
/// use shop_floor_tracker::i18n::t;
/// let msg = t("common.success");
/// ```
pub fn t(key: &str) -> String {
    rust_i18n::t!(key).to_string()
}

/// 翻译消息（带参数, 当前语言）
///
/// # 示例
/// ```no_run
/// use shop_floor_tracker::i18n::t_with_args;
/// let msg = t_with_args("errors.already_completed", &[("operation", "OP-1")]);
/// ```
pub fn t_with_args(key: &str, args: &[(&str, &str)]) -> String {
    interpolate(rust_i18n::t!(key).to_string(), args)
}

/// 翻译消息（带参数, 指定语言）
///
/// 工位终端各自带语言偏好, 不修改全局 locale
pub fn t_with_args_in(locale: &str, key: &str, args: &[(&str, &str)]) -> String {
    interpolate(rust_i18n::t!(key, locale = locale).to_string(), args)
}

fn interpolate(mut result: String, args: &[(&str, &str)]) -> String {
    for (k, v) in args {
        let placeholder = format!("%{{{}}}", k);
        result = result.replace(&placeholder, v);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // rust-i18n 的 locale 为全局状态，且 Rust 测试默认并行执行；
    // 为避免测试互相干扰，这里对 i18n 相关测试串行化。
    static LOCALE_TEST_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn test_set_locale() {
        let _guard = LOCALE_TEST_LOCK.lock().unwrap();
        set_locale("en");
        assert_eq!(current_locale(), "en");

        // 恢复默认语言
        set_locale("zh-CN");
        assert_eq!(current_locale(), "zh-CN");
    }

    #[test]
    fn test_translate_simple() {
        let _guard = LOCALE_TEST_LOCK.lock().unwrap();
        set_locale("zh-CN");
        assert_eq!(t("common.success"), "操作成功");

        set_locale("en");
        assert_eq!(t("common.success"), "Operation successful");

        set_locale("zh-CN");
    }

    #[test]
    fn test_translate_in_explicit_locale() {
        let msg = t_with_args_in(
            "en",
            "errors.sequence_violation",
            &[("operation", "OP-2"), ("sequence", "20"), ("blocking", "10")],
        );
        assert!(msg.starts_with("Previous operation not yet complete"));
        assert!(msg.contains("OP-2"));
        assert!(!msg.contains("%{"));

        let msg = t_with_args_in(
            "zh-CN",
            "errors.quantity_overrun",
            &[("operation", "OP-1"), ("expected", "8"), ("received", "10")],
        );
        assert!(msg.contains("投入 8"));
        assert!(msg.contains("提交 10"));
    }
}
