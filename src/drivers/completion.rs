//! Raw-text completion driver.
//!
//! Besides the plain passthrough this driver has to undo what the upstream
//! does to echoed prompts: with `echo` the returned text (and, with
//! `logprobs`, the token arrays) cover prompt + completion, so the prompt
//! part is cut off and, when logprobs were requested, kept separately as the
//! prompt's own logprobs.

use serde_json::Value;

use super::{sampling_args, EngineDriver};
use crate::engine::EngineMode;
use crate::error::{Error, ErrorContext};
use crate::types::{
    CompletionChoice, MetaResponse, Prompt, PromptEcho, QueryParams, TokenLogprobs,
    FINISH_REASON_API_ERROR,
};
use crate::Result;

#[derive(Debug, Clone, Copy, Default)]
pub struct CompletionDriver;

impl CompletionDriver {
    fn expect_text<'a>(&self, prompt: &'a Prompt) -> Result<&'a str> {
        match prompt {
            Prompt::Text(text) => Ok(text),
            Prompt::Chat(_) => Err(Error::validation_with_context(
                "text completion engines require a plain string prompt",
                ErrorContext::new()
                    .with_field_path("prompt")
                    .with_details("got a chat conversation")
                    .with_source("completion_driver"),
            )),
        }
    }
}

impl EngineDriver for CompletionDriver {
    fn mode(&self) -> EngineMode {
        EngineMode::TextCompletion
    }

    fn canonical_prompt(&self, prompt: &Prompt) -> Result<String> {
        self.expect_text(prompt).map(str::to_string)
    }

    fn preflight(&self, prompts: &[Prompt], _params: &QueryParams) -> Result<()> {
        for prompt in prompts {
            self.expect_text(prompt)?;
        }
        Ok(())
    }

    fn build_args(&self, model: &str, prompts: &[Prompt], params: &QueryParams) -> Result<Value> {
        let texts = prompts
            .iter()
            .map(|p| self.expect_text(p).map(|t| Value::String(t.to_string())))
            .collect::<Result<Vec<_>>>()?;
        let mut args = sampling_args(model, params);
        args.insert("prompt".into(), Value::Array(texts));
        Ok(Value::Object(args))
    }

    fn normalize(
        &self,
        model: &str,
        prompt: &Prompt,
        mut choices: Vec<CompletionChoice>,
        params: &QueryParams,
    ) -> Result<MetaResponse> {
        let text = self.expect_text(prompt)?;
        let wrap = |completions: Vec<CompletionChoice>, logprobs: Option<TokenLogprobs>| {
            MetaResponse {
                prompt: PromptEcho::Text {
                    text: text.to_string(),
                    logprobs,
                },
                completions,
                model: model.to_string(),
            }
        };

        // Placeholders carry an error message, not an echo; leave them alone.
        if choices.first().map_or(true, CompletionChoice::is_api_error) {
            return Ok(wrap(choices, None));
        }

        let prompt_len = text.chars().count();

        if !params.include_logprobs() {
            if params.echo_prompt {
                for choice in &mut choices {
                    strip_echo(choice, text, prompt_len);
                }
            }
            return Ok(wrap(choices, None));
        }

        if params.echo_prompt {
            // Offsets are the same for every choice of one prompt, so the
            // first choice decides where the prompt ends.
            let split = choices[0]
                .logprobs
                .as_ref()
                .map(|lp| lp.first_index_at_or_after(prompt_len))
                .ok_or_else(|| Error::malformed("logprobs requested but missing from choice"))?;

            let mut prompt_logprobs = None;
            for (i, choice) in choices.iter_mut().enumerate() {
                strip_echo(choice, text, prompt_len);
                if let Some(lp) = choice.logprobs.as_mut() {
                    let head = lp.split_off_front(split);
                    if i == 0 {
                        prompt_logprobs = Some(head);
                    }
                }
            }
            return Ok(wrap(choices, prompt_logprobs));
        }

        // Without echo the upstream still tends to lead with the prompt's last
        // token. Heuristic: if the second token starts exactly where the prompt
        // ends, the first one belongs to the prompt.
        for choice in &mut choices {
            if let Some(lp) = choice.logprobs.as_mut() {
                if lp.text_offset.len() > 1 && lp.text_offset[1] == prompt_len {
                    lp.drop_first();
                }
            }
        }
        Ok(wrap(choices, None))
    }

    fn placeholder(&self, message: &str, index: u32) -> CompletionChoice {
        CompletionChoice::text(message, FINISH_REASON_API_ERROR).with_index(index)
    }
}

/// Cut the echoed prompt off the front of a choice's text.
fn strip_echo(choice: &mut CompletionChoice, prompt: &str, prompt_len: usize) {
    if let Some(text) = choice.text.take() {
        let rest = match text.strip_prefix(prompt) {
            Some(rest) => rest.to_string(),
            None => text.chars().skip(prompt_len).collect(),
        };
        choice.text = Some(rest);
    }
}
