use std::sync::LazyLock;

use regex::Regex;

use crate::error::AppError;

/// 会被 sanitize_input 删除的字符序列，按顺序处理
const DANGEROUS_SEQUENCES: [&str; 6] = ["<", ">", "\"", "'", ";", "--"];

static NAME_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[\p{L} '\-]+$").expect("valid name pattern"));

static EMAIL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").expect("valid email pattern")
});

/// 名称：2 到 100 个字符，只允许字母（含重音字母）、空格、连字符和撇号
pub fn validate_name(name: &str) -> bool {
    let len = name.chars().count();
    (2..=100).contains(&len) && NAME_PATTERN.is_match(name)
}

/// 邮箱：local@domain.tld
pub fn validate_email(email: &str) -> bool {
    EMAIL_PATTERN.is_match(email)
}

/// 删除危险字符（不是转义）
pub fn sanitize_input(input: &str) -> String {
    DANGEROUS_SEQUENCES
        .iter()
        .fold(input.to_string(), |acc, seq| acc.replace(seq, ""))
}

/// 路径中的 ID 必须是正整数
pub fn parse_id(raw: &str) -> Result<i64, AppError> {
    match raw.trim().parse::<i64>() {
        Ok(id) if id > 0 => Ok(id),
        _ => Err(AppError::validation("Invalid user ID")),
    }
}
