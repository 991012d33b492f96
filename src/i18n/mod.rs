// ============================================================================
// Offload - 国际化模块
// ============================================================================
//
// 文件: src/i18n/mod.rs
// 职责: 国际化支持和翻译管理
// 边界:
//   - ✅ 翻译表选择和查找
//   - ✅ 翻译宏定义和实现
//   - ✅ 参数化翻译支持
//   - ❌ 不应包含具体翻译内容
//   - ❌ 不应包含业务逻辑
//
// ============================================================================

pub mod en_us;
pub mod zh_cn;

/// 获取翻译文本
pub fn get_translation(key: &str) -> String {
    // 每次都从配置获取语言设置
    let language = get_language_from_config().unwrap_or_else(|| "en_us".to_string());
    lookup(&language, key)
}

/// 在指定语言的翻译表中查找
pub fn lookup(language: &str, key: &str) -> String {
    let translation_data = match language {
        "zh_cn" => zh_cn::TRANSLATIONS,
        _ => en_us::TRANSLATIONS, // 默认使用英文
    };

    translation_data
        .iter()
        .find(|(k, _)| *k == key)
        .map(|(_, v)| v.to_string())
        .unwrap_or_else(|| format!("Unknown translation key: {}", key))
}

/// 从配置获取语言设置
fn get_language_from_config() -> Option<String> {
    use crate::models::config::Config;

    // 配置未初始化时返回 None
    Config::get_language().ok()
}

/// 简单翻译宏
#[macro_export]
macro_rules! t {
    ($key:expr) => {
        $crate::i18n::get_translation($key)
    };
}

/// 带参数翻译的辅助函数
pub fn format_with_args(template: String, args: Vec<String>) -> String {
    let mut result = template;
    let mut from = 0;
    for arg in args.iter() {
        // 替换下一个 {} 占位符，已替换的参数内容不再参与匹配
        if let Some(pos) = result[from..].find("{}") {
            let pos = from + pos;
            result.replace_range(pos..pos + 2, arg);
            from = pos + arg.len();
        }
    }
    result
}

/// 带参数的翻译宏
#[macro_export]
macro_rules! tf {
    ($key:expr, $($arg:expr),*) => {{
        let template = $crate::i18n::get_translation($key);
        let args = vec![$(format!("{}", $arg)),*];
        $crate::i18n::format_with_args(template, args)
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholders_are_filled_in_order() {
        let out = format_with_args("{} of {} chunks".to_string(), vec!["3".into(), "4".into()]);
        assert_eq!(out, "3 of 4 chunks");
    }

    #[test]
    fn arguments_containing_braces_are_not_rescanned() {
        let out = format_with_args("{}: {}".to_string(), vec!["{}".into(), "x".into()]);
        assert_eq!(out, "{}: x");
    }

    #[test]
    fn tables_share_keys() {
        for (key, _) in en_us::TRANSLATIONS {
            assert!(
                zh_cn::TRANSLATIONS.iter().any(|(k, _)| k == key),
                "missing zh_cn translation for {}",
                key
            );
        }
        assert_eq!(lookup("zh_cn", "error.empty_command"), "未指定要执行的命令");
        assert!(lookup("en_us", "no.such.key").starts_with("Unknown translation key"));
    }
}
