//! Customer-support CRM: customers, tickets and the kanban board.
//!
//! | Module       | Responsibility                                          |
//! |--------------|---------------------------------------------------------|
//! | `models`     | Records, enums and response views                       |
//! | `status`     | Column name to ticket status mapping                    |
//! | `validation` | Request payloads and their checked forms                |
//! | `db`         | SQLite persistence and board snapshots                  |
//! | `store`      | `TicketStore`/`BoardReader` seams over persistence      |
//! | `placement`  | Drag-and-drop planning and the placement engine         |
//! | `api`        | REST routes and the response envelope                   |
//! | `ws`         | WebSocket change feed                                   |
//! | `server`     | Router assembly and the serve loop                      |
//! | `client`     | HTTP implementation of the store seams                  |

pub mod api;
pub mod client;
pub mod db;
pub mod models;
pub mod placement;
pub mod server;
pub mod status;
pub mod store;
pub mod validation;
pub mod ws;
