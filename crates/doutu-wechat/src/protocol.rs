//! Wire formats of the web WeChat endpoints.
//!
//! Login endpoints answer with JavaScript assignments or XML; the session API
//! speaks PascalCase JSON.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use doutu_core::{errors::Error, Result};

fn re(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("valid regex"))
}

/// `window.QRLogin.code = 200; window.QRLogin.uuid = "xxx==";`
pub fn parse_jslogin(body: &str) -> Result<String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let caps = re(&RE, r#"window\.QRLogin\.code\s*=\s*(\d+);\s*window\.QRLogin\.uuid\s*=\s*"([^"]+)""#)
        .captures(body)
        .ok_or_else(|| Error::Protocol(format!("unexpected jslogin response: {}", preview(body))))?;

    if &caps[1] != "200" {
        return Err(Error::External(format!("jslogin refused with code {}", &caps[1])));
    }
    Ok(caps[2].to_string())
}

/// Result of one login long-poll.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoginPoll {
    pub code: String,
    pub redirect_uri: Option<String>,
}

/// `window.code=200;\nwindow.redirect_uri="https://...";`
pub fn parse_login_poll(body: &str) -> Result<LoginPoll> {
    static CODE: OnceLock<Regex> = OnceLock::new();
    static REDIRECT: OnceLock<Regex> = OnceLock::new();

    let code = re(&CODE, r"window\.code\s*=\s*(\d+);")
        .captures(body)
        .map(|c| c[1].to_string())
        .ok_or_else(|| Error::Protocol(format!("unexpected login response: {}", preview(body))))?;
    let redirect_uri = re(&REDIRECT, r#"window\.redirect_uri\s*=\s*"([^"]+)""#)
        .captures(body)
        .map(|c| c[1].to_string());

    Ok(LoginPoll { code, redirect_uri })
}

/// Credentials returned by `webwxnewloginpage`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoginPage {
    pub skey: String,
    pub sid: String,
    pub uin: String,
    pub pass_ticket: String,
}

pub fn parse_login_page(xml: &str) -> Result<LoginPage> {
    let ret = xml_value(xml, "ret").unwrap_or_default();
    if ret != "0" {
        let message = xml_value(xml, "message").unwrap_or_default();
        return Err(Error::External(format!(
            "login page refused: ret={ret} message={message}"
        )));
    }

    let field = |tag: &str| {
        xml_value(xml, tag)
            .ok_or_else(|| Error::Protocol(format!("login page is missing <{tag}>")))
    };
    Ok(LoginPage {
        skey: field("skey")?,
        sid: field("wxsid")?,
        uin: field("wxuin")?,
        pass_ticket: field("pass_ticket")?,
    })
}

fn xml_value(xml: &str, tag: &str) -> Option<String> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let start = xml.find(&open)? + open.len();
    let len = xml[start..].find(&close)?;
    Some(xml[start..start + len].to_string())
}

/// `window.synccheck={retcode:"0",selector:"2"}`
pub fn parse_sync_check(body: &str) -> Result<(String, String)> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let caps = re(&RE, r#"retcode\s*:\s*"(\d+)"\s*,\s*selector\s*:\s*"(\d+)""#)
        .captures(body)
        .ok_or_else(|| Error::Protocol(format!("unexpected synccheck response: {}", preview(body))))?;
    Ok((caps[1].to_string(), caps[2].to_string()))
}

/// Split a received group message into `(member, text)`.
///
/// Group messages from other members arrive as `@member:<br/>text`.
pub fn split_group_content(content: &str) -> (Option<&str>, &str) {
    match content.split_once(":<br/>") {
        Some((member, text)) if member.starts_with('@') && !member.contains(' ') => {
            (Some(member), text)
        }
        _ => (None, content),
    }
}

/// Undo the HTML escaping of message content.
pub fn unescape_content(s: &str) -> String {
    s.replace("<br/>", "\n")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

/// The account was @-mentioned by display name.
pub fn mentions(text: &str, nickname: &str) -> bool {
    if nickname.is_empty() {
        return false;
    }
    let needle = format!("@{nickname}");
    text.match_indices(&needle).any(|(idx, _)| {
        let rest = &text[idx + needle.len()..];
        rest.is_empty() || rest.starts_with(char::is_whitespace)
    })
}

fn preview(body: &str) -> String {
    body.chars().take(120).collect()
}

// ============== JSON API ==============

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct BaseRequest {
    pub uin: i64,
    pub sid: String,
    pub skey: String,
    #[serde(rename = "DeviceID")]
    pub device_id: String,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BaseResponse {
    pub ret: i64,
    #[serde(default)]
    pub err_msg: String,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct SyncKey {
    pub count: u32,
    #[serde(default)]
    pub list: Vec<SyncKeyItem>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct SyncKeyItem {
    pub key: i64,
    pub val: i64,
}

impl SyncKey {
    /// `key_val|key_val` form used by `synccheck`.
    pub fn to_query(&self) -> String {
        self.list
            .iter()
            .map(|i| format!("{}_{}", i.key, i.val))
            .collect::<Vec<_>>()
            .join("|")
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Contact {
    pub user_name: String,
    #[serde(default)]
    pub nick_name: String,
    #[serde(default)]
    pub remark_name: String,
}

impl Contact {
    pub fn display_name(&self) -> &str {
        if !self.remark_name.is_empty() {
            &self.remark_name
        } else if !self.nick_name.is_empty() {
            &self.nick_name
        } else {
            &self.user_name
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InitResponse {
    pub base_response: BaseResponse,
    pub user: Contact,
    #[serde(default)]
    pub sync_key: SyncKey,
    #[serde(default)]
    pub contact_list: Vec<Contact>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContactListResponse {
    pub base_response: BaseResponse,
    #[serde(default)]
    pub member_list: Vec<Contact>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RawMessage {
    #[serde(default)]
    pub msg_id: String,
    pub from_user_name: String,
    pub to_user_name: String,
    pub msg_type: u32,
    #[serde(default)]
    pub content: String,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SyncResponse {
    pub base_response: BaseResponse,
    #[serde(default)]
    pub add_msg_list: Vec<RawMessage>,
    #[serde(default)]
    pub mod_contact_list: Vec<Contact>,
    #[serde(default)]
    pub sync_key: SyncKey,
    #[serde(default)]
    pub sync_check_key: SyncKey,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct UploadResponse {
    pub base_response: BaseResponse,
    #[serde(default)]
    pub media_id: String,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SendResponse {
    pub base_response: BaseResponse,
}

/// Fail on a non-zero `BaseResponse.Ret`.
pub fn check_base(endpoint: &str, base: &BaseResponse) -> Result<()> {
    if base.ret == 0 {
        return Ok(());
    }
    Err(Error::External(format!(
        "{endpoint} failed: ret={} {}",
        base.ret, base.err_msg
    )))
}
