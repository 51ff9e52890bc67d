use serde::{Deserialize, Serialize};

use crate::app::{NanorssError, Result};
use crate::domain::page::UserPagemonitor;

/// A registered user and the documents describing their subscriptions.
///
/// The username is the identity and lives in the store key, not in the
/// persisted value. OPML and pagemonitor documents are kept verbatim and only
/// parsed when [`User::feeds`] or [`User::pages`] is called.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct User {
    #[serde(skip)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub opml: String,
    #[serde(default)]
    pub pagemonitor: String,
    #[serde(skip)]
    new_username: Option<String>,
}

/// A feed subscription parsed from a user's OPML document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserFeed {
    pub url: String,
    pub title: String,
}

impl User {
    pub fn new(username: &str) -> Result<Self> {
        Ok(Self {
            username: normalize_username(username)?,
            ..Default::default()
        })
    }

    /// Stages a rename; it takes effect when the user is saved.
    pub fn set_username(&mut self, username: &str) -> Result<()> {
        let username = normalize_username(username)?;
        if username == self.username {
            self.new_username = None;
        } else {
            self.new_username = Some(username);
        }
        Ok(())
    }

    pub fn pending_username(&self) -> Option<&str> {
        self.new_username.as_deref()
    }

    pub(crate) fn take_pending_username(&mut self) -> Option<String> {
        self.new_username.take()
    }

    pub fn set_password(&mut self, password: &str) -> Result<()> {
        self.password = bcrypt::hash(password, bcrypt::DEFAULT_COST)?;
        Ok(())
    }

    pub fn validate_password(&self, password: &str) -> bool {
        if self.password.is_empty() {
            return false;
        }
        bcrypt::verify(password, &self.password).unwrap_or(false)
    }

    pub fn feeds(&self) -> Result<Vec<UserFeed>> {
        parse_opml(&self.opml)
    }

    pub fn pages(&self) -> Result<Vec<UserPagemonitor>> {
        parse_pagemonitor(&self.pagemonitor)
    }
}

pub fn normalize_username(username: &str) -> Result<String> {
    let username = username.trim();
    if username.is_empty() {
        return Err(NanorssError::Invalid("username cannot be empty".into()));
    }
    Ok(username.to_string())
}

#[derive(Debug, Default, Deserialize)]
struct OpmlDocument {
    #[serde(default)]
    body: OpmlBody,
}

#[derive(Debug, Default, Deserialize)]
struct OpmlBody {
    #[serde(rename = "outline", default)]
    outlines: Vec<Outline>,
}

#[derive(Debug, Deserialize)]
struct Outline {
    #[serde(rename = "@xmlUrl", default)]
    xml_url: String,
    #[serde(rename = "@title", default)]
    title: String,
    #[serde(rename = "@text", default)]
    text: String,
    #[serde(rename = "outline", default)]
    outlines: Vec<Outline>,
}

impl Outline {
    fn collect_feeds(self, feeds: &mut Vec<UserFeed>) {
        if !self.xml_url.is_empty() {
            let title = [&self.title, &self.text, &self.xml_url]
                .into_iter()
                .find(|s| !s.is_empty())
                .cloned()
                .unwrap_or_default();
            feeds.push(UserFeed {
                url: self.xml_url,
                title,
            });
        }
        for child in self.outlines {
            child.collect_feeds(feeds);
        }
    }
}

/// Flattens every outline with a non-empty `xmlUrl`, at any depth.
pub fn parse_opml(document: &str) -> Result<Vec<UserFeed>> {
    if document.trim().is_empty() {
        return Ok(Vec::new());
    }
    let opml: OpmlDocument = quick_xml::de::from_str(document)
        .map_err(|e| NanorssError::Invalid(format!("bad OPML document: {}", e)))?;

    let mut feeds = Vec::new();
    for outline in opml.body.outlines {
        outline.collect_feeds(&mut feeds);
    }
    Ok(feeds)
}

#[derive(Debug, Default, Deserialize)]
struct PagesDocument {
    #[serde(rename = "page", default)]
    pages: Vec<PageElement>,
}

#[derive(Debug, Deserialize)]
struct PageElement {
    #[serde(rename = "@url")]
    url: String,
    #[serde(rename = "@match", default)]
    match_pattern: String,
    #[serde(rename = "@replace", default)]
    replace_pattern: String,
    #[serde(rename = "$text", default)]
    title: String,
}

pub fn parse_pagemonitor(document: &str) -> Result<Vec<UserPagemonitor>> {
    if document.trim().is_empty() {
        return Ok(Vec::new());
    }
    let pages: PagesDocument = quick_xml::de::from_str(document)
        .map_err(|e| NanorssError::Invalid(format!("bad pagemonitor document: {}", e)))?;

    Ok(pages
        .pages
        .into_iter()
        .map(|page| UserPagemonitor {
            url: page.url,
            match_pattern: page.match_pattern,
            replace_pattern: page.replace_pattern,
            title: page.title.trim().to_string(),
        })
        .collect())
}

/// Parses both documents and checks that every subscription URL is absolute.
pub fn validate_documents(opml: &str, pagemonitor: &str) -> Result<()> {
    let feed_urls = parse_opml(opml)?.into_iter().map(|f| f.url);
    let page_urls = parse_pagemonitor(pagemonitor)?.into_iter().map(|p| p.url);
    for address in feed_urls.chain(page_urls) {
        url::Url::parse(&address)
            .map_err(|e| NanorssError::Invalid(format!("bad URL {:?}: {}", address, e)))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_user_trims_username() {
        let user = User::new("  user01 ").unwrap();
        assert_eq!(user.username, "user01");
    }

    #[test]
    fn test_empty_username_rejected() {
        assert!(matches!(User::new("   "), Err(NanorssError::Invalid(_))));

        let mut user = User::new("user01").unwrap();
        assert!(user.set_username("").is_err());
        assert_eq!(user.pending_username(), None);
    }

    #[test]
    fn test_set_username_to_same_name_is_not_a_rename() {
        let mut user = User::new("user01").unwrap();
        user.set_username("user02").unwrap();
        assert_eq!(user.pending_username(), Some("user02"));
        user.set_username(" user01 ").unwrap();
        assert_eq!(user.pending_username(), None);
    }

    #[test]
    fn test_password_validation() {
        let mut user = User::new("user01").unwrap();
        assert!(!user.validate_password(""));
        user.set_password("pass1").unwrap();
        assert!(user.validate_password("pass1"));
        assert!(!user.validate_password("pass2"));
    }

    #[test]
    fn test_parse_nested_opml() {
        let opml = r#"<?xml version="1.0" encoding="UTF-8"?>
<opml version="1.0">
  <head><title>Subscriptions</title></head>
  <body>
    <outline text="Folder">
      <outline text="Feed 1" title="Feed 1" type="rss" xmlUrl="http://feed1"/>
      <outline text="Nested">
        <outline xmlUrl="http://feed2"/>
      </outline>
    </outline>
    <outline text="Feed 3" xmlUrl="http://feed3"/>
  </body>
</opml>"#;
        let feeds = parse_opml(opml).unwrap();
        assert_eq!(
            feeds,
            vec![
                UserFeed {
                    url: "http://feed1".into(),
                    title: "Feed 1".into()
                },
                UserFeed {
                    url: "http://feed2".into(),
                    title: "http://feed2".into()
                },
                UserFeed {
                    url: "http://feed3".into(),
                    title: "Feed 3".into()
                },
            ]
        );
    }

    #[test]
    fn test_parse_empty_documents() {
        assert!(parse_opml("").unwrap().is_empty());
        assert!(parse_pagemonitor("  ").unwrap().is_empty());
    }

    #[test]
    fn test_parse_bad_opml() {
        assert!(matches!(
            parse_opml("<opml><body><outline"),
            Err(NanorssError::Invalid(_))
        ));
    }

    #[test]
    fn test_parse_pagemonitor() {
        let doc = r#"<pages>
  <page url="http://site1" match="m1" replace="r1"/>
  <page url="http://site2">Site 2</page>
</pages>"#;
        let pages = parse_pagemonitor(doc).unwrap();
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].url, "http://site1");
        assert_eq!(pages[0].match_pattern, "m1");
        assert_eq!(pages[0].replace_pattern, "r1");
        assert_eq!(pages[0].title, "");
        assert_eq!(pages[1].url, "http://site2");
        assert_eq!(pages[1].match_pattern, "");
        assert_eq!(pages[1].title, "Site 2");
    }

    #[test]
    fn test_validate_documents() {
        let opml = r#"<opml><body><outline xmlUrl="http://feed1"/></body></opml>"#;
        assert!(validate_documents(opml, "").is_ok());

        let relative = r#"<opml><body><outline xmlUrl="feed1.xml"/></body></opml>"#;
        assert!(matches!(
            validate_documents(relative, ""),
            Err(NanorssError::Invalid(_))
        ));
        assert!(validate_documents("", r#"<pages><page url="/x"/></pages>"#).is_err());
    }
}
