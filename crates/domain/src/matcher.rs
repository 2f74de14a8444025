/// 整词匹配：评论按空白切分后，必须有一个完整 token 等于关键词。
/// 只做大小写折叠，不做分词/Unicode 归一化（"LINKS" 不会命中 "link"）。
pub fn matches(comment_text: &str, keyword: &str) -> bool {
    let keyword = keyword.trim().to_lowercase();
    if keyword.is_empty() {
        return false;
    }
    comment_text
        .trim()
        .to_lowercase()
        .split_whitespace()
        .any(|word| word == keyword)
}
