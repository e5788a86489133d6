//! TalkingBot // Response
//!
//! Uniform value returned by every command, converted to a Discord message by the handler.

/// A field of an embed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

/// Rich display payload, a platform independent embed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Embed {
    pub title: Option<String>,
    pub description: Option<String>,
    pub url: Option<String>,
    pub thumbnail: Option<String>,
    pub color: u32,
    pub fields: Vec<EmbedField>,
}

impl Embed {
    pub fn new(color: u32) -> Self {
        Self {
            color,
            ..Default::default()
        }
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn thumbnail(mut self, thumbnail: Option<String>) -> Self {
        self.thumbnail = thumbnail;
        self
    }

    pub fn field(mut self, name: impl Into<String>, value: impl Into<String>, inline: bool) -> Self {
        self.fields.push(EmbedField {
            name: name.into(),
            value: value.into(),
            inline,
        });
        self
    }
}

/// What the bot answers to a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Plain text message.
    pub text: Option<String>,

    /// Rich payload.
    pub embed: Option<Embed>,

    /// Only the invoking user can see the message.
    pub ephemeral: bool,
}

impl Response {
    /// Plain text visible to everyone.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            embed: None,
            ephemeral: false,
        }
    }

    /// Plain text visible only to the invoking user.
    pub fn ephemeral(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            embed: None,
            ephemeral: true,
        }
    }

    pub fn embed(embed: Embed) -> Self {
        Self {
            text: None,
            embed: Some(embed),
            ephemeral: false,
        }
    }

    /// Text content, or an empty string for embed-only responses.
    pub fn content(&self) -> &str {
        self.text.as_deref().unwrap_or_default()
    }
}
