//! Prompt templates rendered when a client enters a state
//!
//! Templates are read-only once the manager is built. Every state that talks
//! to the user must resolve to exactly one template; this is checked once at
//! startup by [`TemplateRegistry::validate`].

use crate::error::ConfigurationError;
use crate::state_machine::{Button, ContentType, Context, OutboundMessage, WorkflowState};
use std::collections::HashMap;

/// Placeholders a template body or header may reference
const PLACEHOLDERS: &[&str] = &[
    "content_type",
    "platforms",
    "supported_platforms",
    "caption",
    "schedule",
    "media_options",
];

/// How a template's buttons are produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ButtonSet {
    None,
    Fixed(Vec<Button>),
    /// One button per content type
    ContentTypes,
    /// One button per platform supporting the chosen content type, plus "All"
    SupportedPlatforms,
}

/// Named, versioned prompt definition for one state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    pub name: String,
    pub version: u32,
    pub state: WorkflowState,
    pub header: Option<String>,
    pub body: String,
    pub buttons: ButtonSet,
}

impl Template {
    pub fn new(name: impl Into<String>, state: WorkflowState, body: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: 1,
            state,
            header: None,
            body: body.into(),
            buttons: ButtonSet::None,
        }
    }

    pub fn version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    pub fn header(mut self, header: impl Into<String>) -> Self {
        self.header = Some(header.into());
        self
    }

    pub fn buttons(mut self, buttons: ButtonSet) -> Self {
        self.buttons = buttons;
        self
    }

    fn placeholders(&self) -> Result<Vec<String>, ConfigurationError> {
        let mut found = Vec::new();
        for text in std::iter::once(&self.body).chain(self.header.as_ref()) {
            let mut rest = text.as_str();
            while let Some((_, after)) = rest.split_once('{') {
                let Some((name, tail)) = after.split_once('}') else {
                    return Err(ConfigurationError::UnterminatedPlaceholder {
                        name: self.name.clone(),
                    });
                };
                found.push(name.to_string());
                rest = tail;
            }
        }
        Ok(found)
    }

    fn render(&self, ctx: &Context) -> OutboundMessage {
        let body = fill(&self.body, ctx);
        let header = self.header.as_ref().map(|h| fill(h, ctx));
        let buttons = match &self.buttons {
            ButtonSet::None => vec![],
            ButtonSet::Fixed(buttons) => buttons.clone(),
            ButtonSet::ContentTypes => ContentType::ALL
                .into_iter()
                .map(|ct| Button::new(ct.as_str(), capitalize(ct.as_str())))
                .collect(),
            ButtonSet::SupportedPlatforms => {
                let supported = ctx
                    .content_type
                    .map(ContentType::supported_platforms)
                    .unwrap_or_default();
                let multiple = supported.len() > 1;
                let mut buttons: Vec<Button> = supported
                    .into_iter()
                    .map(|p| Button::new(p.as_str(), p.display_name()))
                    .collect();
                if multiple {
                    buttons.push(Button::new("all", "All Platforms"));
                }
                buttons
            }
        };

        if buttons.is_empty() {
            OutboundMessage::Text { body }
        } else {
            OutboundMessage::Buttons {
                header,
                body,
                buttons,
            }
        }
    }
}

/// Lookup of templates by state
#[derive(Debug, Clone, Default)]
pub struct TemplateRegistry {
    templates: Vec<Template>,
}

impl TemplateRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_template(mut self, template: Template) -> Self {
        self.templates.push(template);
        self
    }

    /// Replace any template for the same state with `template`
    pub fn override_template(mut self, template: Template) -> Self {
        self.templates.retain(|t| t.state != template.state);
        self.templates.push(template);
        self
    }

    /// Check that every speaking state has exactly one well-formed template
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let mut counts: HashMap<WorkflowState, usize> = HashMap::new();
        for template in &self.templates {
            *counts.entry(template.state).or_default() += 1;
            for placeholder in template.placeholders()? {
                if !PLACEHOLDERS.contains(&placeholder.as_str()) {
                    return Err(ConfigurationError::UnknownPlaceholder {
                        name: template.name.clone(),
                        placeholder,
                    });
                }
            }
        }

        for state in WorkflowState::ALL {
            if !state.produces_output() {
                continue;
            }
            match counts.get(&state).copied().unwrap_or(0) {
                0 => return Err(ConfigurationError::MissingTemplate(state)),
                1 => {}
                count => return Err(ConfigurationError::AmbiguousTemplate { state, count }),
            }
        }
        Ok(())
    }

    pub fn get(&self, state: WorkflowState) -> Option<&Template> {
        self.templates.iter().find(|t| t.state == state)
    }

    /// Render the prompt for `state` against `ctx`
    pub fn render(&self, state: WorkflowState, ctx: &Context) -> Vec<OutboundMessage> {
        self.get(state)
            .map(|t| vec![t.render(ctx)])
            .unwrap_or_default()
    }

    /// The stock prompts of the posting workflow
    pub fn builtin() -> Self {
        let yes_no = |yes: &str, no: &str| {
            ButtonSet::Fixed(vec![Button::new("yes", yes), Button::new("no", no)])
        };

        Self::empty()
            .with_template(Template::new(
                "init",
                WorkflowState::Init,
                "👋 To create a social media post, please type 'Hi'.",
            ))
            .with_template(
                Template::new(
                    "content_type_selection",
                    WorkflowState::ContentTypeSelection,
                    "👋 Let's create a post. What type of content would you like to post?",
                )
                .header("Content Type Selection")
                .buttons(ButtonSet::ContentTypes),
            )
            .with_template(
                Template::new(
                    "platform_selection",
                    WorkflowState::PlatformSelection,
                    "📱 For {content_type} content you can post to {supported_platforms}. \
                     Pick one, several separated by commas, or 'All'.",
                )
                .header("Platforms for {content_type}")
                .buttons(ButtonSet::SupportedPlatforms),
            )
            .with_template(Template::new(
                "caption_input",
                WorkflowState::CaptionInput,
                "✍️ Please describe what your {content_type} post for {platforms} should say:",
            ))
            .with_template(
                Template::new(
                    "caption_approval",
                    WorkflowState::CaptionGeneration,
                    "Here is the caption for your post:\n\n{caption}\n\n\
                     Reply 'y' to use it or 'n' for a new variation.",
                )
                .buttons(ButtonSet::Fixed(vec![
                    Button::new("y", "Use this"),
                    Button::new("n", "New variation"),
                ])),
            )
            .with_template(
                Template::new(
                    "image_inclusion",
                    WorkflowState::ImageInclusionDecision,
                    "🖼️ Would you like to include an image in your post?",
                )
                .header("Image Selection")
                .buttons(ButtonSet::Fixed(vec![
                    Button::new("yes_images", "Yes, include image"),
                    Button::new("no_images", "No, caption only"),
                ])),
            )
            .with_template(
                Template::new(
                    "media_source",
                    WorkflowState::MediaSourceSelection,
                    "Where should the image come from? Upload your own or search a stock library.",
                )
                .buttons(ButtonSet::Fixed(vec![
                    Button::new("upload", "Upload"),
                    Button::new("unsplash", "Unsplash"),
                    Button::new("pexels", "Pexels"),
                    Button::new("pixabay", "Pixabay"),
                ])),
            )
            .with_template(Template::new(
                "media_upload",
                WorkflowState::WaitingForMediaUpload,
                "📤 Please upload the image you want to use, or reply 'back' to pick another source.",
            ))
            .with_template(
                Template::new(
                    "schedule_selection",
                    WorkflowState::ScheduleSelection,
                    "🗓️ When would you like to post this content? Choose an option or send a \
                     time as YYYY-MM-DD HH:MM (UTC).",
                )
                .header("Schedule Selection")
                .buttons(ButtonSet::Fixed(vec![
                    Button::new("now", "Post Now"),
                    Button::new("later", "Later Today"),
                    Button::new("tomorrow", "Tomorrow"),
                    Button::new("next week", "Next Week"),
                ])),
            )
            .with_template(
                Template::new(
                    "confirmation",
                    WorkflowState::Confirmation,
                    "📋 Here's a summary of your post:\n\nContent Type: {content_type}\n\
                     Platforms: {platforms}\nSchedule: {schedule}\nCaption: {caption}\n\n\
                     Is this correct?",
                )
                .header("Confirmation")
                .buttons(yes_no("Yes, Post It", "No, Start Over")),
            )
            .with_template(Template::new(
                "cancelled",
                WorkflowState::Cancelled,
                "Your post has been cancelled. Type 'Hi' whenever you want to start again.",
            ))
    }
}

fn fill(text: &str, ctx: &Context) -> String {
    let supported = ctx
        .content_type
        .map(|ct| {
            ct.supported_platforms()
                .into_iter()
                .map(|p| p.display_name())
                .collect::<Vec<_>>()
                .join(", ")
        })
        .unwrap_or_default();
    let caption = ctx
        .approved_caption
        .as_deref()
        .or(ctx.candidate_caption.as_deref())
        .unwrap_or_default();

    let media_options = ctx
        .media_options
        .iter()
        .enumerate()
        .map(|(i, item)| match &item.description {
            Some(description) => format!("{}. {description}", i + 1),
            None => format!("{}. {}", i + 1, item.url),
        })
        .collect::<Vec<_>>()
        .join("\n");

    text.replace(
        "{content_type}",
        &ctx.content_type.map(|c| capitalize(c.as_str())).unwrap_or_default(),
    )
    .replace("{platforms}", &ctx.platform_list())
    .replace("{supported_platforms}", &supported)
    .replace("{caption}", caption)
    .replace("{media_options}", &media_options)
    .replace(
        "{schedule}",
        &ctx.schedule.map(|s| s.to_string()).unwrap_or_default(),
    )
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
