//! Submitted forms, their validation and the values echoed back on errors.

use crate::server::{Result, ServerError, media::ImageFormat};
use axum::{
    body::Bytes,
    extract::{FromRequest, Multipart},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use yatube_common::model::{
    Id, Text,
    group::GroupMarker,
    post::Post,
    user::{Password, Username},
};
use yatube_db::client::DbClient;

pub const REQUIRED: &str = "This field is required.";
pub const INVALID_CHOICE: &str =
    "Select a valid choice. That choice is not one of the available choices.";
pub const INVALID_IMAGE: &str =
    "Upload a valid image. The file you uploaded was either not an image or a corrupted image.";
pub const INVALID_USERNAME: &str = "Enter a valid username. This value may contain only letters, \
    numbers, and @/./+/-/_ characters.";
pub const PASSWORD_TOO_SHORT: &str =
    "This password is too short. It must contain at least 8 characters.";
pub const USERNAME_TAKEN: &str = "A user with that username already exists.";
pub const INVALID_LOGIN: &str = "Please enter a correct username and password. Note that both \
    fields may be case-sensitive.";

/// Key for errors that belong to the whole form.
pub const NON_FIELD_ERRORS: &str = "__all__";

#[derive(FromRequest, Debug, Clone, Copy, Default)]
#[from_request(via(axum::Form), rejection(ServerError))]
pub struct Form<T>(pub T);

/// Messages per field name.
#[derive(Clone, Eq, PartialEq, Debug, Default, Serialize)]
#[serde(transparent)]
pub struct FormErrors(BTreeMap<&'static str, Vec<&'static str>>);

impl FormErrors {
    pub fn add(&mut self, field: &'static str, message: &'static str) {
        self.0.entry(field).or_default().push(message);
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[cfg(test)]
    pub fn field(&self, field: &str) -> &[&'static str] {
        self.0.get(field).map_or(&[], Vec::as_slice)
    }
}

/// Raw post form, as submitted or prefilled from an existing post.
#[derive(Clone, Eq, PartialEq, Debug, Default)]
pub struct PostForm {
    pub text: String,
    pub group: String,
    pub image: Option<Bytes>,
}

/// What a post form context shows: the values and any errors.
#[derive(Clone, Eq, PartialEq, Debug, Default, Serialize)]
pub struct PostFormContext {
    pub text: String,
    pub group: String,
    pub errors: FormErrors,
}

#[derive(Clone, Eq, PartialEq, Debug)]
pub struct ValidPostForm {
    pub text: Text,
    pub group: Option<Id<GroupMarker>>,
    pub image: Option<(ImageFormat, Bytes)>,
}

impl PostForm {
    #[must_use]
    pub fn from_post(post: &Post) -> Self {
        Self {
            text: post.text.get().to_owned(),
            group: post
                .group
                .as_ref()
                .map(|group| group.id.to_string())
                .unwrap_or_default(),
            image: None,
        }
    }

    /// Reads the `text`, `group` and `image` fields. Other fields are skipped
    /// and an empty file counts as no upload.
    pub async fn from_multipart(mut multipart: Multipart) -> Result<Self> {
        let mut form = Self::default();

        while let Some(field) = multipart.next_field().await? {
            let name = field.name().map(str::to_owned);
            match name.as_deref() {
                Some("text") => form.text = field.text().await?,
                Some("group") => form.group = field.text().await?,
                Some("image") => {
                    let bytes = field.bytes().await?;
                    form.image = (!bytes.is_empty()).then_some(bytes);
                }
                _ => {}
            }
        }

        Ok(form)
    }

    /// The outer error is a failed lookup, the inner one a rejected form.
    pub async fn validate(&self, db: &DbClient) -> Result<Result<ValidPostForm, FormErrors>> {
        let mut errors = FormErrors::default();

        let text = Text::new(self.text.clone())
            .inspect_err(|_| errors.add("text", REQUIRED))
            .ok();

        let group = match self.group.trim() {
            "" => None,
            group => {
                let group_id = group.parse::<Id<GroupMarker>>().ok();
                let exists = match group_id {
                    Some(group_id) => db.fetch_group(group_id).await?.is_some(),
                    None => false,
                };
                if !exists {
                    errors.add("group", INVALID_CHOICE);
                }
                group_id.filter(|_| exists)
            }
        };

        let image = match &self.image {
            None => None,
            Some(bytes) => match ImageFormat::sniff(bytes) {
                Some(format) => Some((format, bytes.clone())),
                None => {
                    errors.add("image", INVALID_IMAGE);
                    None
                }
            },
        };

        match text {
            Some(text) if errors.is_empty() => Ok(Ok(ValidPostForm { text, group, image })),
            _ => Ok(Err(errors)),
        }
    }

    #[must_use]
    pub fn into_context(self, errors: FormErrors) -> PostFormContext {
        PostFormContext {
            text: self.text,
            group: self.group,
            errors,
        }
    }
}

#[derive(Clone, Eq, PartialEq, Debug, Default, Deserialize)]
pub struct CommentForm {
    #[serde(default)]
    pub text: String,
}

impl CommentForm {
    #[must_use]
    pub fn validate(self) -> Option<Text> {
        Text::new(self.text).ok()
    }
}

/// Username and password, for both signup and login.
#[derive(Clone, Eq, PartialEq, Default, Deserialize)]
pub struct CredentialsForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    /// Where to go after login.
    #[serde(default)]
    pub next: String,
}

impl std::fmt::Debug for CredentialsForm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialsForm")
            .field("username", &self.username)
            .field("password", &"[redacted]")
            .field("next", &self.next)
            .finish()
    }
}

/// Everything but the password goes back to the client.
#[derive(Clone, Eq, PartialEq, Debug, Default, Serialize)]
pub struct CredentialsFormContext {
    pub username: String,
    pub next: String,
    pub errors: FormErrors,
}

impl CredentialsForm {
    pub fn validate_signup(&self) -> Result<(Username, Password), FormErrors> {
        let mut errors = FormErrors::default();

        let username = match self.username.as_str() {
            "" => {
                errors.add("username", REQUIRED);
                None
            }
            username => Username::new(username.to_owned())
                .inspect_err(|_| errors.add("username", INVALID_USERNAME))
                .ok(),
        };
        let password = match self.password.as_str() {
            "" => {
                errors.add("password", REQUIRED);
                None
            }
            password => Password::new(password.to_owned())
                .inspect_err(|_| errors.add("password", PASSWORD_TOO_SHORT))
                .ok(),
        };

        match (username, password) {
            (Some(username), Some(password)) => Ok((username, password)),
            _ => Err(errors),
        }
    }

    /// Any well-formed pair. Length rules only apply to new passwords.
    pub fn validate_login(&self) -> Result<(Username, Password), FormErrors> {
        let mut errors = FormErrors::default();
        if self.username.is_empty() {
            errors.add("username", REQUIRED);
        }
        if self.password.is_empty() {
            errors.add("password", REQUIRED);
        }
        if !errors.is_empty() {
            return Err(errors);
        }

        match Username::new(self.username.clone()) {
            Ok(username) => Ok((username, Password::unchecked(self.password.clone()))),
            Err(_) => {
                errors.add(NON_FIELD_ERRORS, INVALID_LOGIN);
                Err(errors)
            }
        }
    }

    #[must_use]
    pub fn into_context(self, errors: FormErrors) -> CredentialsFormContext {
        CredentialsFormContext {
            username: self.username,
            next: self.next,
            errors,
        }
    }
}
