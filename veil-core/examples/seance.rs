//! A miniature case demonstrating the engine end to end.
//!
//! Run with: `cargo run -p veil-core --example seance`

use rand::thread_rng;
use veil_core::{
    ActionClass, EntityId, EntityStateStore, EvaluationContext, NormalizedInstruction,
    ResolutionConfig, ResolutionEngine, ScopeId, SelectionConfig, StoreConfig, Trigger,
    TriggerBook, TriggerSelector,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("veil_core=debug")),
        )
        .init();

    let mut store = EntityStateStore::new(StoreConfig::default())?;
    let selector = TriggerSelector::new(SelectionConfig::default())?;
    let resolver = ResolutionEngine::new(ResolutionConfig::default())?;
    let mut rng = thread_rng();

    let book = TriggerBook::from_triggers([
        Trigger::new(
            "confession",
            3,
            "trust>=70 AND evidence:seance_photo",
            "tpl.confession",
        ),
        Trigger::new("nervous_glance", 2, "evidence_count>=2", "tpl.nervous_glance"),
        Trigger::new("candle_gutter", 1, "", "tpl.candle_gutter").rare(),
        Trigger::new("parlor_chat", 1, "", "tpl.parlor_chat"),
    ]);

    let medium = EntityId::from("madame_vesna");
    let scope = ScopeId::from("madame_vesna");

    // Turn one: nothing discovered yet, only idle commentary can fire.
    {
        let state = store.entity_mut(&medium);
        let ctx = EvaluationContext::for_entity(state);
        match selector.select(&book, &ctx, state, &mut rng) {
            Some(trigger) => println!("narrate: {}", trigger.template),
            None => println!("a quiet turn"),
        }
    }

    // The player snoops around and then pries with a restricted casting.
    {
        let state = store.entity_mut(&medium);
        state.discover_evidence("seance_photo");
        state.discover_evidence("wax_drippings");

        let casting = NormalizedInstruction::new("compulsion")
            .with_intent_phrase("to make her name the sitter in the photo");
        let outcome =
            resolver.resolve(ActionClass::Restricted, &casting, &scope, state, &mut rng);
        println!(
            "compulsion: succeeded={} detected={:?} trust_delta={}",
            outcome.succeeded, outcome.detected, outcome.trust_delta
        );
        println!("trust is now {}", state.trust());
    }

    // Another commentary turn now that evidence has piled up.
    {
        let state = store.entity_mut(&medium);
        let ctx = EvaluationContext::for_entity(state);
        if let Some(trigger) = selector.select(&book, &ctx, state, &mut rng) {
            println!("narrate: {}", trigger.template);
        }
    }

    Ok(())
}
