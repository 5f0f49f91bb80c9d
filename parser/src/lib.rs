pub mod api;
pub mod atn;
mod candidates;
pub mod context;
mod core;
mod factory;
pub mod follow;
pub mod token;
mod translate;

pub use api::{CandidateRule, CandidatesCollection, CompletionOptions, CompletionStats, GrammarId};
pub use candidates::longest_common_prefix;
pub use context::{AcceptAllPredicates, PredicateEvaluator, RuleContext};
pub use self::core::{CodeCompletionCore, RuleEndStatus};
pub use factory::CompletionFactory;
pub use follow::FollowSetCache;
pub use token::{Token, TokenStream, TokenType, VecTokenStream, EOF};
pub use translate::{RuleTranslator, RuleWithStartToken};

mod logging;
pub use logging::Logger;

pub use anyhow;

#[macro_export]
macro_rules! loginfo {
    ($s:expr, $($arg:tt)*) => {
        if $s.level_enabled(2) {
            use std::fmt::Write;
            writeln!($s.info_logger(), $($arg)*).unwrap();
        }
    };
}

#[macro_export]
macro_rules! infoln {
    ($s:expr, $($arg:tt)*) => {
        if $s.logger.level_enabled(2) {
            use std::fmt::Write;
            writeln!($s.logger.info_logger(), $($arg)*).unwrap();
        }
    };
}

#[macro_export]
macro_rules! warn {
    ($s:expr, $($arg:tt)*) => {
        if $s.logger.level_enabled(1) {
            use std::fmt::Write;
            $s.logger.write_warning("Warning: ");
            writeln!($s.logger.warning_logger(), $($arg)*).unwrap();
        }
    };
}
