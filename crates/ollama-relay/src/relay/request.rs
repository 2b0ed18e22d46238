use serde::Serialize;

use crate::config::DefaultsConfig;

/// Caller identity attached to a request for tracing only
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Identity {
    pub id: Option<String>,
    pub email: Option<String>,
}

impl Identity {
    pub fn is_empty(&self) -> bool {
        self.id.is_none() && self.email.is_none()
    }
}

/// One generation turn as supplied by the caller
///
/// Optional fields are resolved against [`DefaultsConfig`] when the upstream
/// body is built.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub model: String,
    pub prompt: String,
    pub system_prompt: Option<String>,
    pub temperature: Option<f32>,
    pub identity: Option<Identity>,
}

impl GenerationRequest {
    pub fn new(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            prompt: prompt.into(),
            system_prompt: None,
            temperature: None,
            identity: None,
        }
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_identity(mut self, identity: Identity) -> Self {
        self.identity = if identity.is_empty() {
            None
        } else {
            Some(identity)
        };
        self
    }

    /// System prompt to send; empty strings fall back to the default
    pub fn resolved_system_prompt<'a>(&'a self, defaults: &'a DefaultsConfig) -> &'a str {
        match self.system_prompt.as_deref() {
            Some(prompt) if !prompt.is_empty() => prompt,
            _ => &defaults.system_prompt,
        }
    }

    pub fn resolved_temperature(&self, defaults: &DefaultsConfig) -> f32 {
        self.temperature.unwrap_or(defaults.temperature)
    }

    /// Build the JSON body for `POST /api/generate`
    pub fn to_body<'a>(&'a self, defaults: &'a DefaultsConfig, stream: bool) -> GenerateBody<'a> {
        GenerateBody {
            model: &self.model,
            prompt: &self.prompt,
            stream,
            system: self.resolved_system_prompt(defaults),
            options: GenerateOptions {
                temperature: self.resolved_temperature(defaults),
            },
        }
    }
}

/// Upstream request body: `{model, prompt, stream, system, options: {temperature}}`
#[derive(Debug, Serialize)]
pub struct GenerateBody<'a> {
    pub model: &'a str,
    pub prompt: &'a str,
    pub stream: bool,
    pub system: &'a str,
    pub options: GenerateOptions,
}

#[derive(Debug, Serialize)]
pub struct GenerateOptions {
    pub temperature: f32,
}
