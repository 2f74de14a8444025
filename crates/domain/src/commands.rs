use crate::error::Error;
use serde::Deserialize;

pub const KEYWORD_MAX_LEN: usize = 50;
pub const MESSAGE_MAX_LEN: usize = 1000;

#[derive(Debug, Clone, Deserialize)]
pub struct NewRule {
    pub media_id: String,
    pub media_thumbnail: Option<String>,
    pub media_caption: Option<String>,
    pub keyword: String,
    pub dm_message: String,
    // 缺省开启：同一评论者只回一次
    #[serde(default = "default_reply_once")]
    pub reply_once_per_user: bool,
}

fn default_reply_once() -> bool {
    true
}

impl NewRule {
    pub fn validate(&self) -> Result<(), Error> {
        if self.media_id.trim().is_empty() {
            return Err(Error::Validation("media_id is required".into()));
        }
        validate_keyword(&self.keyword)?;
        validate_message(&self.dm_message)
    }
}

// 更新字段白名单即结构本身：不在这里的字段无法通过管理接口修改
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RuleUpdate {
    pub keyword: Option<String>,
    pub dm_message: Option<String>,
    pub reply_once_per_user: Option<bool>,
    pub active: Option<bool>,
}

impl RuleUpdate {
    pub fn validate(&self) -> Result<(), Error> {
        if let Some(ref k) = self.keyword {
            validate_keyword(k)?;
        }
        if let Some(ref m) = self.dm_message {
            validate_message(m)?;
        }
        Ok(())
    }
}

fn validate_keyword(keyword: &str) -> Result<(), Error> {
    let keyword = keyword.trim();
    if keyword.is_empty() {
        return Err(Error::Validation("keyword is required".into()));
    }
    if keyword.chars().count() > KEYWORD_MAX_LEN {
        return Err(Error::Validation(format!(
            "Keyword must be {} characters or less",
            KEYWORD_MAX_LEN
        )));
    }
    Ok(())
}

fn validate_message(message: &str) -> Result<(), Error> {
    let message = message.trim();
    if message.is_empty() {
        return Err(Error::Validation("dm_message is required".into()));
    }
    if message.chars().count() > MESSAGE_MAX_LEN {
        return Err(Error::Validation(format!(
            "DM message must be {} characters or less",
            MESSAGE_MAX_LEN
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_rule(keyword: &str, message: &str) -> NewRule {
        NewRule {
            media_id: "media1".into(),
            media_thumbnail: None,
            media_caption: None,
            keyword: keyword.into(),
            dm_message: message.into(),
            reply_once_per_user: true,
        }
    }

    #[test]
    fn rejects_oversized_fields() {
        assert!(new_rule(&"k".repeat(51), "hi").validate().is_err());
        assert!(new_rule("link", &"m".repeat(1001)).validate().is_err());
        assert!(new_rule(&"k".repeat(50), &"m".repeat(1000))
            .validate()
            .is_ok());
    }

    #[test]
    fn rejects_blank_fields() {
        assert!(new_rule("", "hi").validate().is_err());
        assert!(new_rule("   ", "hi").validate().is_err());
        assert!(new_rule("link", "  ").validate().is_err());
    }

    #[test]
    fn update_validates_only_present_fields() {
        let update = RuleUpdate {
            active: Some(false),
            ..Default::default()
        };
        assert!(update.validate().is_ok());

        let update = RuleUpdate {
            keyword: Some("x".repeat(51)),
            ..Default::default()
        };
        assert!(update.validate().is_err());
    }
}
