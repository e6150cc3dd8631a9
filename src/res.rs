use serde::Deserialize;

use crate::discord::{Embed, Member};

#[macro_export]
macro_rules! include_res {
    (str, $p:expr) => {
        include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/res", $p))
    };
}

/// A notification embed with `{member_mention}` and `{reason}` placeholders.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Template {
    pub title: String,
    pub description: String,
    pub color: u32,
    pub image_url: Option<String>,
}

impl Template {
    pub fn render(&self, member: &Member, reason: Option<&str>) -> Embed {
        Embed {
            title: self.title.clone(),
            description: self
                .description
                .replace("{member_mention}", &member.mention())
                .replace("{reason}", reason.unwrap_or_default()),
            color: self.color,
            image_url: self.image_url.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Templates {
    pub accepted: Template,
    pub rejected: Template,
}

impl Templates {
    pub fn builtin() -> Result<Templates, serde_json::Error> {
        Ok(Templates {
            accepted: serde_json::from_str(include_res!(str, "/templates/accepted.json"))?,
            rejected: serde_json::from_str(include_res!(str, "/templates/rejected.json"))?,
        })
    }
}
