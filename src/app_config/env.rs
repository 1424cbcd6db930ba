use std::env;

/// 读取布尔型环境变量：支持 true/false/1/0（大小写不敏感）
pub fn env_is_true(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(v) => {
            let v = v.trim();
            v.eq_ignore_ascii_case("true") || v == "1"
        }
        Err(_) => default,
    }
}

/// 读取字符串环境变量，若不存在则返回默认值
pub fn env_or_default(key: &str, default: &str) -> String {
    match env::var(key) {
        Ok(v) => v,
        Err(_) => default.to_string(),
    }
}

/// 读取 f64 环境变量，不存在或解析失败返回默认值
pub fn env_f64(key: &str, default: f64) -> f64 {
    match env::var(key) {
        Ok(v) => v.trim().parse::<f64>().ok().unwrap_or(default),
        Err(_) => default,
    }
}

/// 读取 i64 环境变量，不存在或解析失败返回默认值
pub fn env_i64(key: &str, default: i64) -> i64 {
    match env::var(key) {
        Ok(v) => v.trim().parse::<i64>().ok().unwrap_or(default),
        Err(_) => default,
    }
}

/// 读取 u32 环境变量，不存在或解析失败返回默认值
pub fn env_u32(key: &str, default: u32) -> u32 {
    match env::var(key) {
        Ok(v) => v.trim().parse::<u32>().ok().unwrap_or(default),
        Err(_) => default,
    }
}

/// 读取逗号分隔的字符串列表环境变量
pub fn env_list(key: &str, default: &[&str]) -> Vec<String> {
    match env::var(key) {
        Ok(v) => v
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        Err(_) => default.iter().map(|s| s.to_string()).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_defaults() {
        assert_eq!(env_f64("SQ_TEST_NOT_SET", 0.5), 0.5);
        assert_eq!(env_u32("SQ_TEST_NOT_SET", 3), 3);
        assert_eq!(env_or_default("SQ_TEST_NOT_SET", "abc"), "abc");
        assert!(!env_is_true("SQ_TEST_NOT_SET", false));
    }

    #[test]
    fn test_env_list_default() {
        let list = env_list("SQ_TEST_NOT_SET", &["BTC-USDT-SWAP"]);
        assert_eq!(list, vec!["BTC-USDT-SWAP".to_string()]);
    }
}
