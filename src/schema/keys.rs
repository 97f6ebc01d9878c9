use super::support::{NoteKind, SupportKey};
use strum::{EnumIter, EnumString, IntoStaticStr};

/// UI frameworks a library may integrate with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, EnumIter, EnumString, IntoStaticStr)]
#[strum(serialize_all = "camelCase")]
pub enum Framework {
    React,
    Vue,
    Angular,
    Svelte,
    Solid,
    Preact,
    Qwik,
    Lit,
    WebComponents,
    Vanilla,
}

impl SupportKey for Framework {
    const FIELD: &'static str = "frameworks";
    const NOTE_KIND: NoteKind = NoteKind::Url;
}

/// Capabilities a library may offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, EnumIter, EnumString, IntoStaticStr)]
#[strum(serialize_all = "camelCase")]
pub enum Feature {
    Typescript,
    Ssr,
    TreeShaking,
    Accessibility,
    Keyboard,
    Rtl,
    I18n,
    Theming,
    DarkMode,
    Headless,
    Virtualization,
    Animations,
    Touch,
}

impl SupportKey for Feature {
    const FIELD: &'static str = "features";
    const NOTE_KIND: NoteKind = NoteKind::Text;
}
