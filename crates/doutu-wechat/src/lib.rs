//! Web WeChat adapter.
//!
//! Implements the `doutu-core` ChatClient port over the web WeChat HTTP API:
//! QR login, long-poll message sync, media upload and replies.

use std::{
    collections::{HashMap, VecDeque},
    path::Path,
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use reqwest::{cookie::CookieStore, cookie::Jar, Url};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tokio::sync::Mutex;

use doutu_core::{
    domain::{Account, ChatRef, MediaId},
    errors::Error,
    login::{LoginStatus, QrEvent},
    messaging::{
        port::ChatClient,
        types::{IncomingMessage, MessageKind},
    },
    Result,
};

pub mod protocol;

use protocol::{
    check_base, mentions, parse_jslogin, parse_login_page, parse_login_poll, parse_sync_check,
    split_group_content, unescape_content, BaseRequest, Contact, ContactListResponse,
    InitResponse, RawMessage, SendResponse, SyncKey, SyncResponse, UploadResponse,
};

const APP_ID: &str = "wx782c26e4c19acffb";
const LOGIN_HOST: &str = "https://login.weixin.qq.com";
const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36";
/// Uploads larger than this are sent in chunks.
const UPLOAD_CHUNK: usize = 512 * 1024;
/// Server-side hold time of the login and synccheck long-polls, plus slack.
const LONG_POLL_TIMEOUT: Duration = Duration::from_secs(40);
const UPLOAD_TARGET: &str = "filehelper";

#[derive(Clone, Debug)]
struct Endpoints {
    base: String,
    file: String,
    push: String,
}

impl Endpoints {
    fn from_redirect(redirect_uri: &str) -> Result<Self> {
        let url = Url::parse(redirect_uri)
            .map_err(|e| Error::Protocol(format!("bad redirect uri {redirect_uri:?}: {e}")))?;
        let host = url
            .host_str()
            .ok_or_else(|| Error::Protocol(format!("redirect uri has no host: {redirect_uri}")))?;
        let base = redirect_uri
            .rsplit_once('/')
            .map(|(b, _)| b.to_string())
            .ok_or_else(|| Error::Protocol(format!("bad redirect uri {redirect_uri:?}")))?;

        Ok(Self {
            base,
            file: format!("https://file.{host}/cgi-bin/mmwebwx-bin"),
            push: format!("https://webpush.{host}/cgi-bin/mmwebwx-bin"),
        })
    }
}

#[derive(Clone, Debug)]
struct LoggedIn {
    endpoints: Endpoints,
    skey: String,
    sid: String,
    uin: String,
    pass_ticket: String,
    device_id: String,
    user: ChatRef,
    sync_key: SyncKey,
}

impl LoggedIn {
    fn base_request(&self) -> BaseRequest {
        BaseRequest {
            uin: self.uin.parse().unwrap_or_default(),
            sid: self.sid.clone(),
            skey: self.skey.clone(),
            device_id: self.device_id.clone(),
        }
    }
}

#[derive(Debug, Default)]
struct SessionState {
    session: Option<LoggedIn>,
    /// `UserName -> display name` of known contacts and groups.
    names: HashMap<String, String>,
    ended: bool,
}

#[derive(Clone)]
pub struct WechatClient {
    http: reqwest::Client,
    jar: Arc<Jar>,
    state: Arc<Mutex<SessionState>>,
    inbox: Arc<Mutex<VecDeque<IncomingMessage>>>,
}

impl WechatClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        let jar = Arc::new(Jar::default());
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .cookie_provider(jar.clone())
            .build()
            .map_err(|e| Error::External(format!("wechat http client: {e}")))?;

        Ok(Self {
            http,
            jar,
            state: Arc::new(Mutex::new(SessionState::default())),
            inbox: Arc::new(Mutex::new(VecDeque::new())),
        })
    }

    fn map_err(e: reqwest::Error) -> Error {
        Error::External(format!("wechat request error: {e}"))
    }

    async fn get_text(&self, url: &str, timeout: Option<Duration>) -> Result<String> {
        let mut req = self.http.get(url);
        if let Some(t) = timeout {
            req = req.timeout(t);
        }
        let resp = req.send().await.map_err(Self::map_err)?;
        if !resp.status().is_success() {
            return Err(Error::External(format!("GET {url}: {}", resp.status())));
        }
        resp.text().await.map_err(Self::map_err)
    }

    async fn post_json<T: DeserializeOwned>(&self, url: &str, body: &Value) -> Result<T> {
        let resp = self
            .http
            .post(url)
            .header("Content-Type", "application/json;charset=UTF-8")
            .body(body.to_string())
            .send()
            .await
            .map_err(Self::map_err)?;
        if !resp.status().is_success() {
            return Err(Error::External(format!("POST {url}: {}", resp.status())));
        }
        // The API answers with JSON labelled as text/plain.
        let text = resp.text().await.map_err(Self::map_err)?;
        serde_json::from_str(&text)
            .map_err(|e| Error::Protocol(format!("POST {url}: bad json: {e}")))
    }

    async fn session(&self) -> Result<LoggedIn> {
        self.state
            .lock()
            .await
            .session
            .clone()
            .ok_or_else(|| Error::Protocol("not logged in".to_string()))
    }

    // ============== Login ==============

    async fn fetch_uuid(&self) -> Result<String> {
        let url = format!(
            "{LOGIN_HOST}/jslogin?appid={APP_ID}&fun=new&lang=zh_CN&_={}",
            now_ms()
        );
        parse_jslogin(&self.get_text(&url, None).await?)
    }

    async fn fetch_qr(&self, uuid: &str) -> Result<Vec<u8>> {
        let url = format!("{LOGIN_HOST}/qrcode/{uuid}");
        let resp = self.http.get(&url).send().await.map_err(Self::map_err)?;
        if !resp.status().is_success() {
            return Err(Error::External(format!("GET {url}: {}", resp.status())));
        }
        Ok(resp.bytes().await.map_err(Self::map_err)?.to_vec())
    }

    async fn poll_login(&self, uuid: &str, tip: u8) -> Result<protocol::LoginPoll> {
        let ts = now_ms();
        let url = format!(
            "{LOGIN_HOST}/cgi-bin/mmwebwx-bin/login?loginicon=true&uuid={uuid}&tip={tip}&r={}&_={ts}",
            !(ts / 1000)
        );
        parse_login_poll(&self.get_text(&url, Some(LONG_POLL_TIMEOUT)).await?)
    }

    async fn finish_login(&self, redirect_uri: &str) -> Result<Account> {
        let endpoints = Endpoints::from_redirect(redirect_uri)?;
        let page = self
            .get_text(&format!("{redirect_uri}&fun=new&version=v2"), None)
            .await?;
        let page = parse_login_page(&page)?;

        let mut session = LoggedIn {
            endpoints,
            skey: page.skey,
            sid: page.sid,
            uin: page.uin,
            pass_ticket: page.pass_ticket,
            device_id: device_id(),
            user: ChatRef::new("", ""),
            sync_key: SyncKey::default(),
        };

        let init: InitResponse = self
            .post_json(
                &format!(
                    "{}/webwxinit?r={}&pass_ticket={}",
                    session.endpoints.base,
                    !(now_ms() / 1000),
                    session.pass_ticket
                ),
                &json!({ "BaseRequest": session.base_request() }),
            )
            .await?;
        check_base("webwxinit", &init.base_response)?;

        session.user = ChatRef::new(init.user.user_name.clone(), init.user.display_name());
        session.sync_key = init.sync_key;

        {
            let mut st = self.state.lock().await;
            st.names.clear();
            remember(&mut st.names, &init.contact_list);
            st.session = Some(session.clone());
            st.ended = false;
        }

        if let Err(e) = self.status_notify(&session).await {
            tracing::warn!(error = %e, "webwxstatusnotify failed");
        }
        match self.fetch_contacts(&session).await {
            Ok(contacts) => remember(&mut self.state.lock().await.names, &contacts),
            Err(e) => tracing::warn!(error = %e, "webwxgetcontact failed"),
        }

        Ok(Account { user: session.user })
    }

    async fn status_notify(&self, session: &LoggedIn) -> Result<()> {
        let url = format!(
            "{}/webwxstatusnotify?lang=zh_CN&pass_ticket={}",
            session.endpoints.base, session.pass_ticket
        );
        let body = json!({
            "BaseRequest": session.base_request(),
            "Code": 3,
            "FromUserName": session.user.id.0,
            "ToUserName": session.user.id.0,
            "ClientMsgId": now_ms(),
        });
        let resp: SendResponse = self.post_json(&url, &body).await?;
        check_base("webwxstatusnotify", &resp.base_response)
    }

    async fn fetch_contacts(&self, session: &LoggedIn) -> Result<Vec<Contact>> {
        let url = format!(
            "{}/webwxgetcontact?r={}&seq=0&skey={}&pass_ticket={}",
            session.endpoints.base,
            now_ms(),
            session.skey,
            session.pass_ticket
        );
        let resp: ContactListResponse = self.post_json(&url, &json!({})).await?;
        check_base("webwxgetcontact", &resp.base_response)?;
        Ok(resp.member_list)
    }

    // ============== Sync ==============

    async fn sync_check(&self, session: &LoggedIn) -> Result<(String, String)> {
        let ts = now_ms();
        let url = format!(
            "{}/synccheck?r={ts}&skey={}&sid={}&uin={}&deviceid={}&synckey={}&_={ts}",
            session.endpoints.push,
            session.skey,
            session.sid,
            session.uin,
            session.device_id,
            session.sync_key.to_query()
        );
        parse_sync_check(&self.get_text(&url, Some(LONG_POLL_TIMEOUT)).await?)
    }

    async fn sync(&self, session: &LoggedIn) -> Result<Vec<RawMessage>> {
        let url = format!(
            "{}/webwxsync?sid={}&skey={}&lang=zh_CN&pass_ticket={}",
            session.endpoints.base, session.sid, session.skey, session.pass_ticket
        );
        let body = json!({
            "BaseRequest": session.base_request(),
            "SyncKey": session.sync_key,
            "rr": !(now_ms() / 1000),
        });
        let resp: SyncResponse = self.post_json(&url, &body).await?;
        check_base("webwxsync", &resp.base_response)?;

        let mut st = self.state.lock().await;
        remember(&mut st.names, &resp.mod_contact_list);
        if let Some(s) = st.session.as_mut() {
            if resp.sync_key.count > 0 {
                s.sync_key = resp.sync_key;
            } else if resp.sync_check_key.count > 0 {
                s.sync_key = resp.sync_check_key;
            }
        }
        Ok(resp.add_msg_list)
    }

    // ============== Sending ==============

    async fn send(&self, endpoint: &str, query: &str, msg: Value) -> Result<()> {
        let session = self.session().await?;
        let url = format!(
            "{}/{endpoint}?{query}pass_ticket={}",
            session.endpoints.base, session.pass_ticket
        );
        let body = json!({
            "BaseRequest": session.base_request(),
            "Msg": msg,
            "Scene": 0,
        });
        let resp: SendResponse = self.post_json(&url, &body).await?;
        check_base(endpoint, &resp.base_response)
    }

    fn data_ticket(&self, file_base: &str) -> Option<String> {
        let url = Url::parse(file_base).ok()?;
        let header = self.jar.cookies(&url)?;
        header
            .to_str()
            .ok()?
            .split(';')
            .filter_map(|kv| kv.trim().split_once('='))
            .find(|(k, _)| *k == "webwx_data_ticket")
            .map(|(_, v)| v.to_string())
    }
}

fn remember(names: &mut HashMap<String, String>, contacts: &[Contact]) {
    for c in contacts {
        names.insert(c.user_name.clone(), c.display_name().to_string());
    }
}

/// Turn a synced message into the core's message model.
fn convert_message(
    raw: RawMessage,
    me: &ChatRef,
    names: &HashMap<String, String>,
) -> IncomingMessage {
    let name_of = |id: &str| -> ChatRef {
        if id == me.id.0 {
            return me.clone();
        }
        let name = names.get(id).cloned().unwrap_or_else(|| id.to_string());
        ChatRef::new(id, name)
    };

    let from_self = raw.from_user_name == me.id.0;
    let sender = name_of(&raw.from_user_name);
    let receiver = name_of(&raw.to_user_name);

    let mut text = raw.content.as_str();
    if !from_self && sender.id.is_group() {
        text = split_group_content(text).1;
    }
    let text = unescape_content(text);
    let is_at = !from_self && sender.id.is_group() && mentions(&text, &me.name);

    IncomingMessage {
        kind: MessageKind::from_code(raw.msg_type),
        sender,
        receiver,
        text,
        is_at,
        from_self,
    }
}

#[async_trait]
impl ChatClient for WechatClient {
    async fn login(
        &self,
        on_status: &mut (dyn FnMut(QrEvent) -> Result<()> + Send),
    ) -> Result<Account> {
        let uuid = self.fetch_uuid().await?;
        let qr = self.fetch_qr(&uuid).await?;
        on_status(QrEvent::new(uuid.clone(), LoginStatus::Confirmed, qr.clone()))?;

        let mut tip = 1;
        let redirect_uri = loop {
            let poll = self.poll_login(&uuid, tip).await?;
            tip = 0;
            let status = LoginStatus::from_code(&poll.code);
            on_status(QrEvent::new(uuid.clone(), status.clone(), qr.clone()))?;

            match status {
                LoginStatus::LoggedIn => {
                    break poll.redirect_uri.ok_or_else(|| {
                        Error::Protocol("login accepted without redirect_uri".to_string())
                    })?;
                }
                LoginStatus::ExpiredUnconfirmed => {
                    return Err(Error::Protocol(format!("QR code {uuid} expired")));
                }
                _ => continue,
            }
        };

        self.finish_login(&redirect_uri).await
    }

    async fn recv(&self) -> Result<Option<IncomingMessage>> {
        loop {
            if let Some(msg) = self.inbox.lock().await.pop_front() {
                return Ok(Some(msg));
            }
            if self.state.lock().await.ended {
                return Ok(None);
            }

            let session = self.session().await?;
            let (retcode, selector) = self.sync_check(&session).await?;
            if retcode != "0" {
                tracing::info!(%retcode, "WeChat session ended");
                self.state.lock().await.ended = true;
                return Ok(None);
            }
            if selector == "0" {
                continue;
            }

            let raws = self.sync(&session).await?;
            let converted: Vec<_> = {
                let st = self.state.lock().await;
                raws.into_iter()
                    .map(|raw| convert_message(raw, &session.user, &st.names))
                    .collect()
            };
            self.inbox.lock().await.extend(converted);
        }
    }

    async fn upload_file(&self, path: &Path) -> Result<MediaId> {
        let session = self.session().await?;
        let bytes = tokio::fs::read(path).await?;
        let total = bytes.len();
        let file_name = path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("image.gif")
            .to_string();
        let mime = mime_for(&file_name);
        let media_type = if mime.starts_with("image/") { "pic" } else { "doc" };
        let client_media_id = now_ms();

        let upload_request = json!({
            "UploadType": 2,
            "BaseRequest": session.base_request(),
            "ClientMediaId": client_media_id,
            "TotalLen": total,
            "StartPos": 0,
            "DataLen": total,
            "MediaType": 4,
            "FromUserName": session.user.id.0,
            "ToUserName": UPLOAD_TARGET,
        })
        .to_string();
        let ticket = self.data_ticket(&session.endpoints.file).unwrap_or_default();
        let url = format!("{}/webwxuploadmedia?f=json", session.endpoints.file);

        let chunks: Vec<&[u8]> = if total == 0 {
            vec![&bytes[..]]
        } else {
            bytes.chunks(UPLOAD_CHUNK).collect()
        };
        let n = chunks.len();
        let mut media_id = String::new();

        for (i, chunk) in chunks.into_iter().enumerate() {
            let mut form = reqwest::multipart::Form::new()
                .text("id", "WU_FILE_0")
                .text("name", file_name.clone())
                .text("type", mime.clone())
                .text("lastModifiedDate", chrono::Utc::now().to_rfc2822())
                .text("size", total.to_string());
            if n > 1 {
                form = form
                    .text("chunks", n.to_string())
                    .text("chunk", i.to_string());
            }
            form = form
                .text("mediatype", media_type)
                .text("uploadmediarequest", upload_request.clone())
                .text("webwx_data_ticket", ticket.clone())
                .text("pass_ticket", session.pass_ticket.clone())
                .part(
                    "filename",
                    reqwest::multipart::Part::bytes(chunk.to_vec())
                        .file_name(file_name.clone())
                        .mime_str(&mime)
                        .map_err(|e| Error::External(format!("multipart error: {e}")))?,
                );

            let resp = self
                .http
                .post(&url)
                .multipart(form)
                .send()
                .await
                .map_err(Self::map_err)?;
            if !resp.status().is_success() {
                return Err(Error::External(format!(
                    "webwxuploadmedia: {}",
                    resp.status()
                )));
            }
            let text = resp.text().await.map_err(Self::map_err)?;
            let parsed: UploadResponse = serde_json::from_str(&text)
                .map_err(|e| Error::Protocol(format!("webwxuploadmedia: bad json: {e}")))?;
            check_base("webwxuploadmedia", &parsed.base_response)?;
            if !parsed.media_id.is_empty() {
                media_id = parsed.media_id;
            }
        }

        if media_id.is_empty() {
            return Err(Error::Protocol(
                "webwxuploadmedia returned no MediaId".to_string(),
            ));
        }
        tracing::debug!(file = %file_name, bytes = total, "Uploaded media");
        Ok(MediaId(media_id))
    }

    async fn reply_text(&self, msg: &IncomingMessage, text: &str) -> Result<()> {
        let session = self.session().await?;
        let id = client_msg_id();
        self.send(
            "webwxsendmsg",
            "",
            json!({
                "Type": 1,
                "Content": text,
                "FromUserName": session.user.id.0,
                "ToUserName": msg.chat().id.0,
                "LocalID": id,
                "ClientMsgId": id,
            }),
        )
        .await
    }

    async fn reply_image(
        &self,
        msg: &IncomingMessage,
        ext: &str,
        media_id: &MediaId,
    ) -> Result<()> {
        let session = self.session().await?;
        let id = client_msg_id();
        let to = &msg.chat().id.0;

        if ext.eq_ignore_ascii_case(".gif") {
            self.send(
                "webwxsendemoticon",
                "fun=sys&",
                json!({
                    "Type": 47,
                    "EmojiFlag": 2,
                    "MediaId": media_id.0,
                    "FromUserName": session.user.id.0,
                    "ToUserName": to,
                    "LocalID": id,
                    "ClientMsgId": id,
                }),
            )
            .await
        } else {
            self.send(
                "webwxsendmsgimg",
                "fun=async&f=json&",
                json!({
                    "Type": 3,
                    "MediaId": media_id.0,
                    "Content": "",
                    "FromUserName": session.user.id.0,
                    "ToUserName": to,
                    "LocalID": id,
                    "ClientMsgId": id,
                }),
            )
            .await
        }
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn client_msg_id() -> String {
    format!("{}{:04}", now_ms(), now_nanos() % 10_000)
}

fn device_id() -> String {
    format!("e{:015}", now_nanos() % 1_000_000_000_000_000)
}

fn now_nanos() -> u64 {
    chrono::Utc::now()
        .timestamp_nanos_opt()
        .unwrap_or_default()
        .unsigned_abs()
}

fn mime_for(file_name: &str) -> String {
    mime_guess::from_path(file_name)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}
