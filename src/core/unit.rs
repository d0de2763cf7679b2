//! Build-unit naming.
//!
//! Every page compiles into one build unit named `pages/<route>`; the root
//! page is `pages/index`. The engine names its output after the unit, and the
//! scheduler maps unit names reported by the engine back to pages.

use super::PageId;

/// Prefix shared by all page units.
const PAGE_UNIT_PREFIX: &str = "pages/";

/// Build-unit name for a page.
pub fn unit_name(page: &PageId) -> String {
    if page.is_root() {
        format!("{PAGE_UNIT_PREFIX}index")
    } else {
        format!("{PAGE_UNIT_PREFIX}{}", page.as_str().trim_start_matches('/'))
    }
}

/// Page a build unit belongs to, if the unit is a page unit.
pub fn page_from_unit(name: &str) -> Option<PageId> {
    let rest = name.strip_prefix(PAGE_UNIT_PREFIX)?;
    if rest.is_empty() {
        return None;
    }
    Some(PageId::new(&format!("/{rest}")))
}
