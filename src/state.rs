// src/state.rs
// Composition root state: every handler and the gateway session receive
// their collaborators from here instead of reaching for globals.

use std::sync::Arc;

use crate::config::Config;
use crate::llm::client::CompletionService;
use crate::llm::embeddings::EmbeddingProvider;
use crate::memory::traits::MessageStore;
use crate::services::{ContextAssembler, IdentityBinder};
use crate::whatsapp::{EvolutionClient, GatewaySession};

pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn MessageStore>,
    pub binder: Arc<IdentityBinder>,
    pub assembler: Arc<ContextAssembler>,
    /// Outbound gateway client; `None` until the gateway is configured.
    pub evolution: Option<EvolutionClient>,
    pub gateway: Arc<GatewaySession>,
}

impl AppState {
    pub fn new(
        config: Config,
        store: Arc<dyn MessageStore>,
        embeddings: Arc<dyn EmbeddingProvider>,
        completion: Arc<dyn CompletionService>,
    ) -> Self {
        let binder = Arc::new(IdentityBinder::new(store.clone()));
        let assembler = Arc::new(ContextAssembler::new(
            store.clone(),
            embeddings,
            completion,
            config.max_context_tokens,
            config.vector_search_k,
        ));
        let evolution = config.evolution().map(|settings| EvolutionClient::new(&settings));
        let gateway = Arc::new(GatewaySession::new(
            config.clone(),
            binder.clone(),
            assembler.clone(),
        ));

        Self {
            config,
            store,
            binder,
            assembler,
            evolution,
            gateway,
        }
    }
}
