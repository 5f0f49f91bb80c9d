use std::sync::Arc;

use anyhow::Result;

use crate::{
    api::CompletionOptions, atn::Atn, context::PredicateEvaluator, follow::FollowSetCache,
    token::TokenStream, CodeCompletionCore, Logger,
};

/// Creates completion engines for one grammar. All engines share the
/// automaton and the follow-set cache, and start with the factory's options
/// and log levels.
pub struct CompletionFactory {
    atn: Arc<Atn>,
    follow_sets: Arc<FollowSetCache>,
    stderr_log_level: u32,
    buffer_log_level: u32,
    options: CompletionOptions,
}

impl CompletionFactory {
    pub fn new(atn: Arc<Atn>) -> Result<Self> {
        atn.validate()?;
        Ok(CompletionFactory {
            atn,
            follow_sets: FollowSetCache::global(),
            stderr_log_level: 1,
            buffer_log_level: 0,
            options: CompletionOptions::default(),
        })
    }

    /// Keep follow sets in `cache` instead of the process-wide one.
    pub fn with_follow_set_cache(mut self, cache: Arc<FollowSetCache>) -> Self {
        self.follow_sets = cache;
        self
    }

    pub fn atn(&self) -> &Arc<Atn> {
        &self.atn
    }

    pub fn follow_sets(&self) -> Arc<FollowSetCache> {
        self.follow_sets.clone()
    }

    pub fn options(&self) -> &CompletionOptions {
        &self.options
    }

    pub fn options_mut(&mut self) -> &mut CompletionOptions {
        &mut self.options
    }

    pub fn quiet(&mut self) -> &mut Self {
        self.stderr_log_level = 0;
        self.buffer_log_level = 0;
        self
    }

    pub fn set_buffer_log_level(&mut self, level: u32) -> &mut Self {
        self.buffer_log_level = level;
        self
    }

    pub fn set_stderr_log_level(&mut self, level: u32) -> &mut Self {
        self.stderr_log_level = level;
        self
    }

    pub fn create_core<'a>(
        &self,
        token_stream: &'a dyn TokenStream,
        predicates: &'a dyn PredicateEvaluator,
    ) -> CodeCompletionCore<'a> {
        self.create_core_ext(token_stream, predicates, self.buffer_log_level)
    }

    pub fn create_core_ext<'a>(
        &self,
        token_stream: &'a dyn TokenStream,
        predicates: &'a dyn PredicateEvaluator,
        buffer_log_level: u32,
    ) -> CodeCompletionCore<'a> {
        CodeCompletionCore::from_parts(
            self.atn.clone(),
            token_stream,
            predicates,
            self.follow_sets.clone(),
            self.options.clone(),
            Logger::new(buffer_log_level, self.stderr_log_level),
        )
    }
}
