//! reqwest implementation of [`ContentBackend`].

use std::time::Duration;

use async_trait::async_trait;
use domains::{
    AppError, Content, ContentBackend, Entity, EntityId, Result, UserSummary, VoteDirection,
};
use reqwest::{Client, Method, RequestBuilder, Url};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::dto::{into_entities, WireContent, WirePost, WireUser};
use crate::error::normalize;

pub struct HttpBackend {
    client: Client,
    base_url: Url,
    token: Option<SecretString>,
}

impl HttpBackend {
    /// `timeout` bounds every request; expiry surfaces as `RequestFailed`.
    pub fn new(base_url: &str, timeout: Duration, token: Option<SecretString>) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::request_failed(format!("http client: {e}")))?;
        let base_url = Url::parse(base_url)
            .map_err(|e| AppError::validation(format!("invalid base url {base_url}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(AppError::validation(format!("{base_url} cannot carry a path")));
        }
        Ok(Self {
            client,
            base_url,
            token,
        })
    }

    /// Each segment is percent-encoded on its own, so ids and usernames can
    /// never reach a different route.
    fn request(&self, method: Method, segments: &[&str]) -> Result<RequestBuilder> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| AppError::validation(format!("{} cannot carry a path", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        let builder = self.client.request(method, url);
        Ok(match &self.token {
            Some(token) => builder.bearer_auth(token.expose_secret()),
            None => builder,
        })
    }

    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T> {
        let response = builder.send().await.map_err(transport_error)?;
        let status = response.status();
        debug!(url = %response.url(), status = status.as_u16(), "content service replied");

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(normalize(status.as_u16(), &body));
        }
        response
            .json::<T>()
            .await
            .map_err(|e| AppError::request_failed(format!("undecodable response: {e}")))
    }

    async fn post_entity(&self, builder: RequestBuilder) -> Result<Entity> {
        Entity::try_from(self.send::<WirePost>(builder).await?)
    }

    async fn post_list(&self, builder: RequestBuilder) -> Result<Vec<Entity>> {
        into_entities(self.send::<Vec<WirePost>>(builder).await?)
    }
}

fn transport_error(err: reqwest::Error) -> AppError {
    if err.is_timeout() {
        AppError::request_failed("the content service did not answer in time")
    } else {
        AppError::request_failed(err)
    }
}

#[async_trait]
impl ContentBackend for HttpBackend {
    async fn current_user(&self) -> Result<UserSummary> {
        let user: WireUser = self.send(self.request(Method::GET, &["auth", "me"])?).await?;
        Ok(user.into())
    }

    async fn entity(&self, id: &EntityId) -> Result<Entity> {
        self.post_entity(self.request(Method::GET, &["posts", id.as_str()])?)
            .await
    }

    async fn children(&self, parent: &EntityId) -> Result<Vec<Entity>> {
        self.post_list(self.request(Method::GET, &["posts", parent.as_str(), "comments"])?)
            .await
    }

    async fn feed(&self) -> Result<Vec<Entity>> {
        self.post_list(self.request(Method::GET, &["posts"])?).await
    }

    async fn profile_posts(&self, username: &str) -> Result<Vec<Entity>> {
        self.post_list(self.request(Method::GET, &["users", username, "posts"])?)
            .await
    }

    async fn vote(&self, id: &EntityId, direction: VoteDirection) -> Result<Entity> {
        let action = match direction {
            VoteDirection::Up => "upvote",
            VoteDirection::Down => "downvote",
        };
        self.post_entity(self.request(Method::POST, &["posts", id.as_str(), action])?)
            .await
    }

    async fn create_comment(&self, parent: &EntityId, content: Content) -> Result<Entity> {
        let body = WireContent::from(content);
        self.post_entity(
            self.request(Method::POST, &["posts", parent.as_str(), "comment"])?
                .json(&body),
        )
        .await
    }

    async fn create_post(&self, content: Content) -> Result<Entity> {
        let body = WireContent::from(content);
        self.post_entity(self.request(Method::POST, &["posts", "create"])?.json(&body))
            .await
    }

    async fn delete(&self, id: &EntityId) -> Result<Entity> {
        self.post_entity(self.request(Method::DELETE, &["posts", "delete", id.as_str()])?)
            .await
    }
}
