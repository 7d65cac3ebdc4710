use std::sync::Arc;
use std::time::Duration;

use crate::services::completion::{CompletionClient, CompletionError};

/// One response path per answerable intent category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GeneratorKind {
    Account,
    Knowledge,
    ContractGeneration,
    General,
}

impl GeneratorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            GeneratorKind::Account => "account",
            GeneratorKind::Knowledge => "knowledge",
            GeneratorKind::ContractGeneration => "contractGeneration",
            GeneratorKind::General => "general",
        }
    }
}

/// Fills the persona template for `kind`. The account context block is only
/// ever embedded for `GeneratorKind::Account`.
pub fn build_generator_prompt(
    kind: GeneratorKind,
    query: &str,
    context: Option<&str>,
    token_symbol: &str,
) -> String {
    match kind {
        GeneratorKind::Account => format!(
            "You are a friendly wallet assistant for {token} holders. Use only the account details below to answer. \
             Keep the answer under 50 words and do not invent transactions.\n\n\
             Account details:\n{context}\n\n\
             Question: {query}",
            token = token_symbol,
            context = context.unwrap_or("No account details available."),
            query = query
        ),
        GeneratorKind::Knowledge => format!(
            "You are an expert on Polkadot, Astar and Substrate-based networks. Answer the question accurately \
             and plainly for a {token} user, in under 80 words. Say so when you are not sure.\n\n\
             Question: {query}",
            token = token_symbol,
            query = query
        ),
        GeneratorKind::ContractGeneration => format!(
            "You are a senior smart contract engineer. Write or explain the requested contract using ink! \
             (or Solidity for EVM targets when asked). Return the code in one fenced block followed by a short \
             explanation of how to deploy it.\n\n\
             Request: {query}",
            query = query
        ),
        GeneratorKind::General => format!(
            "You are a helpful assistant inside a {token} wallet chat. Answer briefly, in under 50 words.\n\n\
             Message: {query}",
            token = token_symbol,
            query = query
        ),
    }
}

/// Forwards category prompts to the completion service at the generator
/// temperature and returns the reply unmodified.
pub struct ResponseGenerators {
    completion: Arc<dyn CompletionClient>,
    temperature: f32,
    timeout: Duration,
    token_symbol: String,
}

impl ResponseGenerators {
    pub fn new(
        completion: Arc<dyn CompletionClient>,
        temperature: f32,
        timeout: Duration,
        token_symbol: String,
    ) -> Self {
        Self {
            completion,
            temperature,
            timeout,
            token_symbol,
        }
    }

    pub async fn generate(
        &self,
        kind: GeneratorKind,
        query: &str,
        context: Option<&str>,
    ) -> Result<String, CompletionError> {
        let context = match kind {
            GeneratorKind::Account => context,
            _ => None,
        };
        let prompt = build_generator_prompt(kind, query, context, &self.token_symbol);
        tracing::debug!("Generating {} reply", kind.as_str());

        tokio::time::timeout(
            self.timeout,
            self.completion.complete(&prompt, self.temperature),
        )
        .await
        .map_err(|_| CompletionError::Timeout(self.timeout.as_millis() as u64))?
    }
}
