// ANSI baseline dialect
//
// Double-quoted identifiers, no optional capabilities. Every node renders with the
// trait defaults.

use super::dialect::SqlDialect;
use super::translator::DialectId;
use crate::models::Capabilities;

pub struct AnsiDialect;

impl SqlDialect for AnsiDialect {
    fn id(&self) -> DialectId {
        DialectId::Ansi
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::none()
    }
}
