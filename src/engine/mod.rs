//! Engine module: storage, queue, image and palette collaborators, plus the CLI

pub mod arg_parser;
pub mod cli;
pub mod imaging;
pub mod keys;
pub mod palette;
pub mod progress;
pub mod queue;
pub mod store;

// Re-export commonly used items
pub use arg_parser::{Cli, Commands, CommonArgs, OrchestrateArgs, ProcessArgs};
pub use cli::handle_run;
pub use imaging::{ExtendMode, Interpolation, ResizeOptions, resize_image};
pub use keys::{metadata_key, shard_key};
pub use palette::{PaletteColor, extract_palette, to_hex};
pub use progress::ProgressObserver;
pub use queue::{DiscardQueue, MemoryQueue, MessageQueue, SpoolQueue, load_batch, parse_batch};
pub use store::{ListPage, LocalStore, MemoryStore, ObjectStore};
