// [apps/coordinator/src/lib.rs]
/*!
 * =================================================================
 * APARATO: COORDINATOR LIBRARY ROOT (ESTRATO L3)
 * RESPONSABILIDAD: DEFINICION DEL ARBOL DE MODULOS
 * =================================================================
 */

pub mod bootstrap;
pub mod handlers;
pub mod kernel;
pub mod middleware;
pub mod routes;
pub mod services;
pub mod state;

pub mod prelude {
    pub use crate::kernel::CoordinatorKernel;
    pub use crate::state::{AppState, SystemMode};
}
