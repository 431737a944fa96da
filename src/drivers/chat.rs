//! Chat driver: one conversation per call, no echo, no logprobs.

use serde_json::Value;

use super::{sampling_args, EngineDriver};
use crate::engine::EngineMode;
use crate::error::{Error, ErrorContext};
use crate::types::{
    ChatMessage, CompletionChoice, MetaResponse, Prompt, PromptEcho, QueryParams,
    FINISH_REASON_API_ERROR,
};
use crate::Result;

#[derive(Debug, Clone, Copy, Default)]
pub struct ChatDriver;

impl ChatDriver {
    fn expect_messages<'a>(&self, prompt: &'a Prompt) -> Result<&'a [ChatMessage]> {
        match prompt {
            Prompt::Chat(messages) if !messages.is_empty() => Ok(messages),
            Prompt::Chat(_) => Err(Error::validation_with_context(
                "chat prompt must contain at least one message",
                ErrorContext::new()
                    .with_field_path("prompt")
                    .with_source("chat_driver"),
            )),
            Prompt::Text(_) => Err(Error::validation_with_context(
                "chat engines require a list of role/content messages",
                ErrorContext::new()
                    .with_field_path("prompt")
                    .with_details("got a plain string")
                    .with_source("chat_driver"),
            )),
        }
    }
}

impl EngineDriver for ChatDriver {
    fn mode(&self) -> EngineMode {
        EngineMode::Chat
    }

    fn canonical_prompt(&self, prompt: &Prompt) -> Result<String> {
        Ok(serde_json::to_string(self.expect_messages(prompt)?)?)
    }

    fn preflight(&self, prompts: &[Prompt], params: &QueryParams) -> Result<()> {
        if params.echo_prompt || params.logprobs.is_some() {
            return Err(Error::configuration_with_context(
                "chat engines support neither echo_prompt nor logprobs",
                ErrorContext::new()
                    .with_field_path(if params.echo_prompt {
                        "params.echo_prompt"
                    } else {
                        "params.logprobs"
                    })
                    .with_source("chat_driver"),
            ));
        }
        if prompts.len() != 1 {
            return Err(Error::configuration_with_context(
                "chat engines do not support batched requests",
                ErrorContext::new()
                    .with_field_path("batch_size")
                    .with_details(format!("got {} prompts in one call", prompts.len()))
                    .with_source("chat_driver"),
            ));
        }
        self.expect_messages(&prompts[0])?;
        Ok(())
    }

    fn build_args(&self, model: &str, prompts: &[Prompt], params: &QueryParams) -> Result<Value> {
        self.preflight(prompts, params)?;
        let messages = self.expect_messages(&prompts[0])?;
        let mut args = sampling_args(model, params);
        args.insert("messages".into(), serde_json::to_value(messages)?);
        Ok(Value::Object(args))
    }

    fn normalize(
        &self,
        model: &str,
        prompt: &Prompt,
        choices: Vec<CompletionChoice>,
        _params: &QueryParams,
    ) -> Result<MetaResponse> {
        Ok(MetaResponse {
            prompt: PromptEcho::Chat {
                message: self.expect_messages(prompt)?.to_vec(),
            },
            completions: choices,
            model: model.to_string(),
        })
    }

    fn placeholder(&self, message: &str, index: u32) -> CompletionChoice {
        CompletionChoice::message(ChatMessage::assistant(message), FINISH_REASON_API_ERROR)
            .with_index(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conversation() -> Prompt {
        Prompt::chat(vec![
            ChatMessage::system("You answer math questions."),
            ChatMessage::user("2+2?"),
        ])
    }

    #[test]
    fn test_canonical_prompt_is_stable_json() {
        let a = ChatDriver.canonical_prompt(&conversation()).unwrap();
        let b = ChatDriver.canonical_prompt(&conversation()).unwrap();
        assert_eq!(a, b);
        assert!(a.starts_with(r#"[{"role":"system","content":"You answer"#));
    }

    #[test]
    fn test_rejects_text_prompt() {
        let err = ChatDriver.canonical_prompt(&Prompt::text("hi")).unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
        assert!(ChatDriver.canonical_prompt(&Prompt::chat(vec![])).is_err());
    }

    #[test]
    fn test_preflight_rejects_batches_and_echo() {
        let params = QueryParams::new();
        let err = ChatDriver
            .preflight(&[conversation(), conversation()], &params)
            .unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));

        let echo = QueryParams::new().with_echo_prompt(true);
        assert!(ChatDriver.preflight(&[conversation()], &echo).is_err());
        let logprobs = QueryParams::new().with_logprobs(1);
        assert!(ChatDriver.preflight(&[conversation()], &logprobs).is_err());

        assert!(ChatDriver.preflight(&[conversation()], &params).is_ok());
    }

    #[test]
    fn test_build_args_sends_messages() {
        let args = ChatDriver
            .build_args("gpt-4o-mini", &[conversation()], &QueryParams::new().with_n(3))
            .unwrap();
        assert_eq!(args["messages"][1]["content"], "2+2?");
        assert_eq!(args["n"], 3);
        assert!(args.get("prompt").is_none());
    }

    #[test]
    fn test_normalize_wraps_conversation() {
        let choice = CompletionChoice::message(ChatMessage::assistant("4"), "stop");
        let resp = ChatDriver
            .normalize("gpt-4o-mini", &conversation(), vec![choice], &QueryParams::new())
            .unwrap();
        assert!(matches!(resp.prompt, PromptEcho::Chat { ref message } if message.len() == 2));
        assert_eq!(resp.completions[0].content(), Some("4"));
        assert_eq!(resp.model, "gpt-4o-mini");
    }

    #[test]
    fn test_placeholder_is_assistant_message() {
        let p = ChatDriver.placeholder("upstream error: timeout", 1);
        assert!(p.is_api_error());
        assert_eq!(p.index, 1);
        assert_eq!(p.message.as_ref().unwrap().role, crate::types::MessageRole::Assistant);
    }
}
