//! CLI command implementations.
//!
//! Each submodule owns one or more related `Commands` variants:
//!
//! | Module   | Commands handled                 |
//! |----------|----------------------------------|
//! | `serve`  | `Serve`                          |
//! | `init`   | `Init`                           |
//! | `board`  | `Board show`, `Board move`       |

pub mod board;
pub mod init;
pub mod serve;

pub use board::{cmd_board_move, cmd_board_show};
pub use init::cmd_init;
pub use serve::cmd_serve;
