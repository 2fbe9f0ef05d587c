/// 用户集合名称，也是缓存失效的单位
pub const USERS_COLLECTION: &str = "users";

/// 生成集合列表缓存键，例如 "users:all"
pub fn collection_list_key(collection: &str) -> String {
    format!("{}:all", collection)
}

/// 快照键对应的代数键，例如 "users:all:gen"
pub fn generation_key(key: &str) -> String {
    format!("{}:gen", key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_key() {
        assert_eq!(collection_list_key(USERS_COLLECTION), "users:all");
        assert_eq!(
            generation_key(&collection_list_key(USERS_COLLECTION)),
            "users:all:gen"
        );
    }
}
