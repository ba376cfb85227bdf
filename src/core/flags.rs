//! CK-006: Recipe flags.
//!
//! Every flag family has an *on* and an *off* enumerant (a few have more),
//! so a narrower scope can override the enclosing one explicitly. A family
//! with no enumerant set inherits from the enclosing scope, and in the end
//! from the built-in default.

use std::fmt;

/// A mutually-exclusive group of flag enumerants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Family {
    Cascade,
    Clearstat,
    Ctime,
    Default,
    Errok,
    FileSizeStats,
    Fingerprint,
    Force,
    GateFirst,
    ImplicitAllowed,
    IncludeCookedWarning,
    IngredientsFingerprint,
    MatchMode,
    Meter,
    Mkdir,
    Precious,
    Recurse,
    Shallow,
    Silent,
    Star,
    Stripdot,
    SymlinkIngredients,
    TellPosition,
    Unlink,
    Update,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Flag {
    Cascade,
    CascadeOff,
    Clearstat,
    ClearstatOff,
    Ctime,
    CtimeOff,
    Default,
    DefaultOff,
    Errok,
    ErrokOff,
    FileSizeStats,
    FileSizeStatsOff,
    Fingerprint,
    FingerprintNowrite,
    FingerprintOff,
    Force,
    ForceOff,
    GateFirst,
    GateFirstOff,
    ImplicitAllowed,
    ImplicitAllowedOff,
    IncludeCookedWarning,
    IncludeCookedWarningOff,
    IngredientsFingerprint,
    IngredientsFingerprintOff,
    MatchModeCook,
    MatchModeRegex,
    Meter,
    MeterOff,
    Mkdir,
    MkdirOff,
    Precious,
    PreciousOff,
    Recurse,
    RecurseOff,
    Shallow,
    ShallowOff,
    Silent,
    SilentOff,
    Star,
    StarOff,
    Stripdot,
    StripdotOff,
    SymlinkIngredients,
    SymlinkIngredientsOff,
    TellPosition,
    TellPositionOff,
    Unlink,
    UnlinkOff,
    Update,
    UpdateMax,
    UpdateOff,
}

/// (enumerant, cookbook name, family). The first enumerant listed for a
/// family is its "on" value.
const TABLE: &[(Flag, &str, Family)] = &[
    (Flag::Cascade, "cascade", Family::Cascade),
    (Flag::CascadeOff, "no-cascade", Family::Cascade),
    (Flag::Clearstat, "clearstat", Family::Clearstat),
    (Flag::ClearstatOff, "no-clearstat", Family::Clearstat),
    (Flag::Ctime, "ctime", Family::Ctime),
    (Flag::CtimeOff, "no-ctime", Family::Ctime),
    (Flag::Default, "default", Family::Default),
    (Flag::DefaultOff, "no-default", Family::Default),
    (Flag::Errok, "errok", Family::Errok),
    (Flag::ErrokOff, "no-errok", Family::Errok),
    (Flag::FileSizeStats, "file-size-statistics", Family::FileSizeStats),
    (Flag::FileSizeStatsOff, "no-file-size-statistics", Family::FileSizeStats),
    (Flag::Fingerprint, "fingerprint", Family::Fingerprint),
    (Flag::FingerprintNowrite, "fingerprint-nowrite", Family::Fingerprint),
    (Flag::FingerprintOff, "no-fingerprint", Family::Fingerprint),
    (Flag::Force, "force", Family::Force),
    (Flag::ForceOff, "no-force", Family::Force),
    (Flag::GateFirst, "gate-first", Family::GateFirst),
    (Flag::GateFirstOff, "no-gate-first", Family::GateFirst),
    (Flag::ImplicitAllowed, "implicit-ingredients", Family::ImplicitAllowed),
    (Flag::ImplicitAllowedOff, "no-implicit-ingredients", Family::ImplicitAllowed),
    (Flag::IncludeCookedWarning, "include-cooked-warning", Family::IncludeCookedWarning),
    (Flag::IncludeCookedWarningOff, "no-include-cooked-warning", Family::IncludeCookedWarning),
    (Flag::IngredientsFingerprint, "ingredients-fingerprint", Family::IngredientsFingerprint),
    (Flag::IngredientsFingerprintOff, "no-ingredients-fingerprint", Family::IngredientsFingerprint),
    (Flag::MatchModeCook, "match-mode-cook", Family::MatchMode),
    (Flag::MatchModeRegex, "match-mode-regex", Family::MatchMode),
    (Flag::Meter, "meter", Family::Meter),
    (Flag::MeterOff, "no-meter", Family::Meter),
    (Flag::Mkdir, "mkdir", Family::Mkdir),
    (Flag::MkdirOff, "no-mkdir", Family::Mkdir),
    (Flag::Precious, "precious", Family::Precious),
    (Flag::PreciousOff, "no-precious", Family::Precious),
    (Flag::Recurse, "recurse", Family::Recurse),
    (Flag::RecurseOff, "no-recurse", Family::Recurse),
    (Flag::Shallow, "shallow", Family::Shallow),
    (Flag::ShallowOff, "no-shallow", Family::Shallow),
    (Flag::Silent, "silent", Family::Silent),
    (Flag::SilentOff, "no-silent", Family::Silent),
    (Flag::Star, "star", Family::Star),
    (Flag::StarOff, "no-star", Family::Star),
    (Flag::Stripdot, "stripdot", Family::Stripdot),
    (Flag::StripdotOff, "no-stripdot", Family::Stripdot),
    (Flag::SymlinkIngredients, "symlink-ingredients", Family::SymlinkIngredients),
    (Flag::SymlinkIngredientsOff, "no-symlink-ingredients", Family::SymlinkIngredients),
    (Flag::TellPosition, "tell-position", Family::TellPosition),
    (Flag::TellPositionOff, "no-tell-position", Family::TellPosition),
    (Flag::Unlink, "unlink", Family::Unlink),
    (Flag::UnlinkOff, "no-unlink", Family::Unlink),
    (Flag::Update, "update", Family::Update),
    (Flag::UpdateMax, "update-max", Family::Update),
    (Flag::UpdateOff, "no-update", Family::Update),
];

impl Flag {
    fn entry(self) -> &'static (Flag, &'static str, Family) {
        // TABLE is laid out in declaration order of the enum.
        &TABLE[self as usize]
    }

    pub fn name(self) -> &'static str {
        self.entry().1
    }

    pub fn family(self) -> Family {
        self.entry().2
    }

    fn bit(self) -> u64 {
        1u64 << (self as u32)
    }

    /// Parse a cookbook flag name. Underscores are accepted in place of
    /// hyphens.
    pub fn from_name(name: &str) -> Option<Flag> {
        let name = name.trim().replace('_', "-").to_ascii_lowercase();
        TABLE.iter().find(|(_, n, _)| *n == name).map(|(f, _, _)| *f)
    }

    pub fn all() -> impl Iterator<Item = Flag> {
        TABLE.iter().map(|(f, _, _)| *f)
    }
}

impl fmt::Display for Flag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Family {
    fn members(self) -> impl Iterator<Item = Flag> {
        TABLE
            .iter()
            .filter(move |(_, _, fam)| *fam == self)
            .map(|(f, _, _)| *f)
    }

    fn mask(self) -> u64 {
        self.members().fold(0, |m, f| m | f.bit())
    }

    /// Built-in value when no scope says anything.
    fn builtin(self) -> Flag {
        match self {
            Family::Cascade => Flag::Cascade,
            Family::ImplicitAllowed => Flag::ImplicitAllowed,
            Family::MatchMode => Flag::MatchModeCook,
            Family::Stripdot => Flag::Stripdot,
            other => other
                .members()
                .last()
                .unwrap_or(Flag::CascadeOff),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    Cook,
    Regex,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FingerprintMode {
    Off,
    On,
    /// Use cached fingerprints but never write new ones.
    NoWrite,
}

/// A set of flag enumerants with at most one member per family.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct FlagSet(u64);

impl FlagSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a flag, clearing any sibling of the same family.
    pub fn insert(&mut self, flag: Flag) {
        self.0 &= !flag.family().mask();
        self.0 |= flag.bit();
    }

    pub fn with(mut self, flag: Flag) -> Self {
        self.insert(flag);
        self
    }

    pub fn contains(&self, flag: Flag) -> bool {
        self.0 & flag.bit() != 0
    }

    /// The enumerant set for `family` in this scope, if any.
    pub fn get(&self, family: Family) -> Option<Flag> {
        family.members().find(|f| self.contains(*f))
    }

    /// Fill every family this scope leaves unset from `outer`.
    pub fn inherit(&self, outer: &FlagSet) -> FlagSet {
        let mut merged = *self;
        for (flag, _, family) in TABLE {
            if outer.contains(*flag) && self.get(*family).is_none() {
                merged.insert(*flag);
            }
        }
        merged
    }

    /// Effective enumerant: this scope, else the built-in default.
    pub fn effective(&self, family: Family) -> Flag {
        self.get(family).unwrap_or_else(|| family.builtin())
    }

    fn on(&self, family: Family) -> bool {
        family.members().next() == Some(self.effective(family))
    }

    pub fn names(&self) -> Vec<&'static str> {
        Flag::all()
            .filter(|f| self.contains(*f))
            .map(Flag::name)
            .collect()
    }

    pub fn cascade(&self) -> bool {
        self.on(Family::Cascade)
    }
    pub fn is_default(&self) -> bool {
        self.on(Family::Default)
    }
    pub fn errok(&self) -> bool {
        self.on(Family::Errok)
    }
    pub fn force(&self) -> bool {
        self.on(Family::Force)
    }
    pub fn gate_first(&self) -> bool {
        self.on(Family::GateFirst)
    }
    pub fn implicit_allowed(&self) -> bool {
        self.on(Family::ImplicitAllowed)
    }
    pub fn ingredients_fingerprint(&self) -> bool {
        self.on(Family::IngredientsFingerprint)
    }
    pub fn meter(&self) -> bool {
        self.on(Family::Meter)
    }
    pub fn mkdir(&self) -> bool {
        self.on(Family::Mkdir)
    }
    pub fn precious(&self) -> bool {
        self.on(Family::Precious)
    }
    pub fn recurse(&self) -> bool {
        self.on(Family::Recurse)
    }
    pub fn shallow(&self) -> bool {
        self.on(Family::Shallow)
    }
    pub fn silent(&self) -> bool {
        self.on(Family::Silent)
    }
    pub fn stripdot(&self) -> bool {
        self.on(Family::Stripdot)
    }
    pub fn tell_position(&self) -> bool {
        self.on(Family::TellPosition)
    }
    pub fn unlink(&self) -> bool {
        self.on(Family::Unlink)
    }

    pub fn match_mode(&self) -> MatchMode {
        match self.effective(Family::MatchMode) {
            Flag::MatchModeRegex => MatchMode::Regex,
            _ => MatchMode::Cook,
        }
    }

    pub fn fingerprint_mode(&self) -> FingerprintMode {
        match self.effective(Family::Fingerprint) {
            Flag::Fingerprint => FingerprintMode::On,
            Flag::FingerprintNowrite => FingerprintMode::NoWrite,
            _ => FingerprintMode::Off,
        }
    }
}

/// Parse a list of cookbook flag names.
pub fn parse_flags<S: AsRef<str>>(names: &[S]) -> Result<FlagSet, String> {
    let mut set = FlagSet::new();
    for name in names {
        let flag = Flag::from_name(name.as_ref())
            .ok_or_else(|| format!("unknown flag '{}'", name.as_ref()))?;
        set.insert(flag);
    }
    Ok(set)
}
