pub mod cricbuzz;
pub mod provider;

pub use cricbuzz::Cricbuzz;
pub use provider::LiveScoreProvider;
