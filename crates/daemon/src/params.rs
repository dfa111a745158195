//! Parameter model module for convertd
//!
//! In-memory representation of one encoder's argument line. The external
//! contract is plain string in, plain string out; internally the line is an
//! ordered list of tokens and key/value pairs, with designated filter-chain
//! parameters whose values are ordered, separator-delimited sub-parameter
//! lists (crop/scale/deinterlace filters and codec option chains).
//!
//! Sub-parameter insertion respects a fixed ordering table: crop comes
//! before scale, inverse-telecine filters come before decimation, and both
//! come before plain deinterlacing.

/// Ordering classes for filter-chain sub-parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterClass {
    Crop,
    Scale,
    InverseTelecine,
    Decimate,
    Deinterlace,
    Other,
}

/// Pairs (a, b) meaning sub-parameters of class `a` must precede class `b`
/// within the same filter chain.
pub const FILTER_ORDERING: &[(FilterClass, FilterClass)] = &[
    (FilterClass::Crop, FilterClass::Scale),
    (FilterClass::InverseTelecine, FilterClass::Decimate),
    (FilterClass::InverseTelecine, FilterClass::Deinterlace),
    (FilterClass::Decimate, FilterClass::Deinterlace),
];

/// Maps a concrete filter name to its ordering class.
///
/// Covers the filter vocabularies of every wrapped tool; unknown names are
/// unconstrained and keep insertion order.
pub fn classify_filter(name: &str) -> FilterClass {
    match name {
        "crop" => FilterClass::Crop,
        "scale" => FilterClass::Scale,
        "fieldmatch" | "pullup" | "detelecine" => FilterClass::InverseTelecine,
        "decimate" | "softskip" => FilterClass::Decimate,
        "yadif" | "bwdif" | "pp" | "decomb" => FilterClass::Deinterlace,
        _ => FilterClass::Other,
    }
}

/// Whether class `a` must come before class `b` in a filter chain.
pub fn must_precede(a: FilterClass, b: FilterClass) -> bool {
    FILTER_ORDERING.iter().any(|&(x, y)| x == a && y == b)
}

/// A parameter key whose value is an ordered sub-parameter list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterChainSpec {
    /// Parameter key, e.g. "-vf".
    pub key: &'static str,
    /// Separator between sub-parameters, ',' or ':' depending on the tool.
    pub separator: char,
}

#[derive(Debug, Clone, PartialEq)]
enum Entry {
    /// Bare flag or positional argument.
    Token(String),
    /// Key followed by a value.
    Pair { key: String, value: String },
}

#[derive(Debug, Clone, PartialEq)]
struct SubParam {
    name: String,
    value: Option<String>,
}

impl SubParam {
    fn parse(text: &str) -> Self {
        match text.split_once('=') {
            Some((name, value)) => Self {
                name: name.to_string(),
                value: Some(value.to_string()),
            },
            None => Self {
                name: text.to_string(),
                value: None,
            },
        }
    }

    fn serialize(&self) -> String {
        match &self.value {
            Some(v) => format!("{}={}", self.name, v),
            None => self.name.clone(),
        }
    }
}

/// Ordered, string-backed model of one encoder invocation's arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterModel {
    entries: Vec<Entry>,
    chains: Vec<FilterChainSpec>,
}

impl ParameterModel {
    /// Creates an empty model with the tool's filter-chain keys.
    pub fn new(chains: &[FilterChainSpec]) -> Self {
        Self {
            entries: Vec::new(),
            chains: chains.to_vec(),
        }
    }

    /// Creates a model seeded from a fragment string.
    pub fn from_fragment(fragment: &str, chains: &[FilterChainSpec]) -> Self {
        let mut model = Self::new(chains);
        model.append_fragment(fragment);
        model
    }

    /// Parses a fragment string and appends its parameters in order.
    pub fn append_fragment(&mut self, fragment: &str) {
        let tokens = split_args(fragment);
        let mut i = 0;
        while i < tokens.len() {
            let token = &tokens[i];
            if is_key(token) {
                let takes_value = tokens
                    .get(i + 1)
                    .map(|next| !is_key(next))
                    .unwrap_or(false);
                if takes_value {
                    self.entries.push(Entry::Pair {
                        key: token.clone(),
                        value: tokens[i + 1].clone(),
                    });
                    i += 2;
                    continue;
                }
            }
            self.entries.push(Entry::Token(token.clone()));
            i += 1;
        }
    }

    /// Appends a bare token (flag or positional argument).
    pub fn append_token(&mut self, token: impl Into<String>) {
        self.entries.push(Entry::Token(token.into()));
    }

    /// Appends a key/value pair at the end.
    pub fn append_pair(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.push(Entry::Pair {
            key: key.into(),
            value: value.into(),
        });
    }

    /// Value of the first parameter with the given key.
    pub fn parameter_value(&self, key: &str) -> Option<&str> {
        self.entries.iter().find_map(|e| match e {
            Entry::Pair { key: k, value } if k == key => Some(value.as_str()),
            _ => None,
        })
    }

    /// Whether the key is present at all, as a pair or a bare flag.
    pub fn has_parameter(&self, key: &str) -> bool {
        self.entries.iter().any(|e| match e {
            Entry::Pair { key: k, .. } => k == key,
            Entry::Token(t) => t == key,
        })
    }

    /// Replaces the value of an existing parameter. Returns false when the
    /// key is absent.
    pub fn parameter_replace(&mut self, key: &str, value: &str) -> bool {
        for entry in &mut self.entries {
            match entry {
                Entry::Pair { key: k, value: v } if k == key => {
                    *v = value.to_string();
                    return true;
                }
                Entry::Token(t) if t == key => {
                    *entry = Entry::Pair {
                        key: key.to_string(),
                        value: value.to_string(),
                    };
                    return true;
                }
                _ => {}
            }
        }
        false
    }

    /// Replaces the parameter's value, or appends `key value` when absent.
    /// Applying the same replacement twice leaves the line unchanged.
    pub fn parameter_replace_or_insert(&mut self, key: &str, value: &str) {
        if !self.parameter_replace(key, value) {
            self.append_pair(key, value);
        }
    }

    /// Inserts `key value` immediately after the anchor parameter, or at the
    /// end when the anchor is absent.
    pub fn parameter_insert_after(&mut self, anchor: &str, key: &str, value: Option<&str>) {
        let entry = match value {
            Some(v) => Entry::Pair {
                key: key.to_string(),
                value: v.to_string(),
            },
            None => Entry::Token(key.to_string()),
        };
        match self.position_of(anchor) {
            Some(idx) => self.entries.insert(idx + 1, entry),
            None => self.entries.push(entry),
        }
    }

    /// Inserts `key value` immediately before the anchor parameter, or at
    /// the end when the anchor is absent.
    pub fn parameter_insert_before(&mut self, anchor: &str, key: &str, value: Option<&str>) {
        let entry = match value {
            Some(v) => Entry::Pair {
                key: key.to_string(),
                value: v.to_string(),
            },
            None => Entry::Token(key.to_string()),
        };
        match self.position_of(anchor) {
            Some(idx) => self.entries.insert(idx, entry),
            None => self.entries.push(entry),
        }
    }

    /// Removes the first parameter with the given key. Returns false when
    /// absent.
    pub fn parameter_delete(&mut self, key: &str) -> bool {
        match self.position_of(key) {
            Some(idx) => {
                self.entries.remove(idx);
                true
            }
            None => false,
        }
    }

    /// Removes every pair with the given key whose value fails the
    /// predicate.
    pub fn retain_pairs(&mut self, key: &str, mut keep: impl FnMut(&str) -> bool) {
        self.entries.retain(|e| match e {
            Entry::Pair { key: k, value } if k == key => keep(value),
            _ => true,
        });
    }

    /// Rewrites the value of every pair with the given key.
    pub fn map_pair_values(&mut self, key: &str, mut f: impl FnMut(&str) -> String) {
        for entry in &mut self.entries {
            if let Entry::Pair { key: k, value } = entry {
                if k == key {
                    *value = f(value);
                }
            }
        }
    }

    /// Substitutes template tokens in every value and bare token.
    pub fn substitute_tokens(&mut self, replacements: &[(&str, &str)]) {
        for entry in &mut self.entries {
            let text = match entry {
                Entry::Token(t) => t,
                Entry::Pair { value, .. } => value,
            };
            for (token, replacement) in replacements {
                if text.contains(token) {
                    *text = text.replace(token, replacement);
                }
            }
        }
    }

    /// Value of a sub-parameter inside a filter-chain parameter. Returns the
    /// empty string for a valueless sub-parameter that is present.
    pub fn subparam_value(&self, chain_key: &str, name: &str) -> Option<String> {
        let spec = self.chain_spec(chain_key)?;
        let value = self.parameter_value(chain_key)?;
        parse_subs(value, spec.separator)
            .into_iter()
            .find(|s| s.name == name)
            .map(|s| s.value.unwrap_or_default())
    }

    /// Whether a sub-parameter exists inside a filter-chain parameter.
    pub fn has_subparam(&self, chain_key: &str, name: &str) -> bool {
        self.subparam_value(chain_key, name).is_some()
    }

    /// Replaces a sub-parameter's value in place, or inserts it at the
    /// position mandated by the ordering table. Creates the chain parameter
    /// when it does not exist yet.
    ///
    /// Insertion picks the latest position that still satisfies every
    /// ordering constraint, so unconstrained filters append at the end.
    pub fn subparam_replace_or_insert(&mut self, chain_key: &str, name: &str, value: Option<&str>) {
        let spec = match self.chain_spec(chain_key) {
            Some(s) => *s,
            None => return,
        };

        let sub = SubParam {
            name: name.to_string(),
            value: value.map(|v| v.to_string()),
        };

        match self.parameter_value(chain_key) {
            None => {
                self.append_pair(chain_key, sub.serialize());
            }
            Some(existing) => {
                let mut subs = parse_subs(existing, spec.separator);
                if let Some(slot) = subs.iter_mut().find(|s| s.name == name) {
                    slot.value = sub.value;
                } else {
                    let idx = ordered_insert_position(&subs, &sub.name);
                    subs.insert(idx, sub);
                }
                let serialized = serialize_subs(&subs, spec.separator);
                self.parameter_replace(chain_key, &serialized);
            }
        }
    }

    /// Deletes a sub-parameter. Deleting the last remaining sub-parameter
    /// removes the chain parameter entirely, leaving no dangling key.
    pub fn subparam_delete(&mut self, chain_key: &str, name: &str) -> bool {
        let spec = match self.chain_spec(chain_key) {
            Some(s) => *s,
            None => return false,
        };
        let existing = match self.parameter_value(chain_key) {
            Some(v) => v.to_string(),
            None => return false,
        };

        let mut subs = parse_subs(&existing, spec.separator);
        let before = subs.len();
        subs.retain(|s| s.name != name);
        if subs.len() == before {
            return false;
        }

        if subs.is_empty() {
            self.parameter_delete(chain_key);
        } else {
            let serialized = serialize_subs(&subs, spec.separator);
            self.parameter_replace(chain_key, &serialized);
        }
        true
    }

    /// Serializes the model back into a single argument string. Values
    /// containing whitespace are double-quoted.
    pub fn to_arg_string(&self) -> String {
        let mut parts = Vec::with_capacity(self.entries.len());
        for entry in &self.entries {
            match entry {
                Entry::Token(t) => parts.push(quote_if_needed(t)),
                Entry::Pair { key, value } => {
                    parts.push(key.clone());
                    parts.push(quote_if_needed(value));
                }
            }
        }
        parts.join(" ")
    }

    /// Serializes into an argument vector for process spawning, one element
    /// per token with no quoting.
    pub fn to_args(&self) -> Vec<String> {
        let mut args = Vec::with_capacity(self.entries.len() * 2);
        for entry in &self.entries {
            match entry {
                Entry::Token(t) => args.push(t.clone()),
                Entry::Pair { key, value } => {
                    args.push(key.clone());
                    args.push(value.clone());
                }
            }
        }
        args
    }

    fn chain_spec(&self, key: &str) -> Option<&FilterChainSpec> {
        self.chains.iter().find(|c| c.key == key)
    }

    fn position_of(&self, key: &str) -> Option<usize> {
        self.entries.iter().position(|e| match e {
            Entry::Pair { key: k, .. } => k == key,
            Entry::Token(t) => t == key,
        })
    }
}

/// Splits an argument string into tokens, honoring single and double quotes
/// and collapsing runs of whitespace.
pub fn split_args(line: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;

    for c in line.chars() {
        match quote {
            Some(q) => {
                if c == q {
                    quote = None;
                } else {
                    current.push(c);
                }
            }
            None => match c {
                '"' | '\'' => quote = Some(c),
                c if c.is_whitespace() => {
                    if !current.is_empty() {
                        tokens.push(std::mem::take(&mut current));
                    }
                }
                _ => current.push(c),
            },
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

/// A token is a key when it starts with '-' followed by a non-digit, which
/// keeps negative numbers ("-0.5") recognizable as values.
fn is_key(token: &str) -> bool {
    let mut chars = token.chars();
    matches!(
        (chars.next(), chars.next()),
        (Some('-'), Some(c)) if !c.is_ascii_digit() && c != '.'
    )
}

fn quote_if_needed(value: &str) -> String {
    if value.contains(char::is_whitespace) {
        format!("\"{}\"", value)
    } else {
        value.to_string()
    }
}

fn parse_subs(value: &str, separator: char) -> Vec<SubParam> {
    value
        .split(separator)
        .filter(|s| !s.is_empty())
        .map(SubParam::parse)
        .collect()
}

fn serialize_subs(subs: &[SubParam], separator: char) -> String {
    subs.iter()
        .map(SubParam::serialize)
        .collect::<Vec<_>>()
        .join(&separator.to_string())
}

/// Latest index at which `name` can be inserted without violating the
/// ordering table against any existing sub-parameter.
fn ordered_insert_position(subs: &[SubParam], name: &str) -> usize {
    let class = classify_filter(name);
    let mut lo = 0;
    let mut hi = subs.len();

    for (i, sub) in subs.iter().enumerate() {
        let existing = classify_filter(&sub.name);
        if must_precede(existing, class) {
            lo = lo.max(i + 1);
        }
        if must_precede(class, existing) {
            hi = hi.min(i);
        }
    }

    if hi >= lo {
        hi
    } else {
        lo
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const FFMPEG_CHAINS: &[FilterChainSpec] = &[
        FilterChainSpec {
            key: "-vf",
            separator: ',',
        },
        FilterChainSpec {
            key: "-af",
            separator: ',',
        },
    ];

    const MENCODER_CHAINS: &[FilterChainSpec] = &[
        FilterChainSpec {
            key: "-vf",
            separator: ',',
        },
        FilterChainSpec {
            key: "-lavcopts",
            separator: ':',
        },
    ];

    #[test]
    fn test_parameter_replace_scenario() {
        let mut model = ParameterModel::from_fragment("-b 1500k", FFMPEG_CHAINS);
        assert!(model.parameter_replace("-b", "3000k"));
        assert_eq!(model.to_arg_string(), "-b 3000k");
    }

    #[test]
    fn test_parameter_replace_missing_key() {
        let mut model = ParameterModel::from_fragment("-b 1500k", FFMPEG_CHAINS);
        assert!(!model.parameter_replace("-maxrate", "4000k"));
        assert_eq!(model.to_arg_string(), "-b 1500k");
    }

    #[test]
    fn test_fragment_round_trip() {
        let fragment = "-y -threads 0 -c:v libx264 -b:v 1800k -vf crop=720:480:0:0,scale=640:480";
        let model = ParameterModel::from_fragment(fragment, FFMPEG_CHAINS);
        assert_eq!(model.to_arg_string(), fragment);
    }

    #[test]
    fn test_quoted_value_round_trip() {
        let model =
            ParameterModel::from_fragment("-metadata \"title=My Show\" -y", FFMPEG_CHAINS);
        assert_eq!(model.parameter_value("-metadata"), Some("title=My Show"));
        assert_eq!(model.to_arg_string(), "-metadata \"title=My Show\" -y");
    }

    #[test]
    fn test_negative_number_is_a_value() {
        let model = ParameterModel::from_fragment("-itsoffset -0.5 -i in.ts", FFMPEG_CHAINS);
        assert_eq!(model.parameter_value("-itsoffset"), Some("-0.5"));
        assert_eq!(model.parameter_value("-i"), Some("in.ts"));
    }

    #[test]
    fn test_insert_after_and_before() {
        let mut model = ParameterModel::from_fragment("-i in.ts -c:v libx264", FFMPEG_CHAINS);
        model.parameter_insert_after("-i", "-ss", Some("60"));
        model.parameter_insert_before("-i", "-y", None);
        assert_eq!(model.to_arg_string(), "-y -i in.ts -ss 60 -c:v libx264");
    }

    #[test]
    fn test_parameter_delete() {
        let mut model = ParameterModel::from_fragment("-y -b 1500k -an", FFMPEG_CHAINS);
        assert!(model.parameter_delete("-b"));
        assert!(model.parameter_delete("-an"));
        assert!(!model.parameter_delete("-b"));
        assert_eq!(model.to_arg_string(), "-y");
    }

    #[test]
    fn test_crop_before_scale_either_insert_order() {
        // crop first, then scale
        let mut model = ParameterModel::new(FFMPEG_CHAINS);
        model.subparam_replace_or_insert("-vf", "crop", Some("720:480:0:0"));
        model.subparam_replace_or_insert("-vf", "scale", Some("640:480"));
        assert_eq!(
            model.parameter_value("-vf"),
            Some("crop=720:480:0:0,scale=640:480")
        );

        // scale first, then crop: crop still ends up first
        let mut model = ParameterModel::new(FFMPEG_CHAINS);
        model.subparam_replace_or_insert("-vf", "scale", Some("640:480"));
        model.subparam_replace_or_insert("-vf", "crop", Some("720:480:0:0"));
        assert_eq!(
            model.parameter_value("-vf"),
            Some("crop=720:480:0:0,scale=640:480")
        );
    }

    #[test]
    fn test_telecine_filter_ordering() {
        // Insert in the worst order: deinterlace, decimate, inverse-telecine.
        let mut model = ParameterModel::new(FFMPEG_CHAINS);
        model.subparam_replace_or_insert("-vf", "yadif", None);
        model.subparam_replace_or_insert("-vf", "decimate", None);
        model.subparam_replace_or_insert("-vf", "fieldmatch", None);
        assert_eq!(
            model.parameter_value("-vf"),
            Some("fieldmatch,decimate,yadif")
        );
    }

    #[test]
    fn test_unconstrained_subparam_appends() {
        let mut model = ParameterModel::new(FFMPEG_CHAINS);
        model.subparam_replace_or_insert("-vf", "crop", Some("720:480:0:0"));
        model.subparam_replace_or_insert("-vf", "setdar", Some("16/9"));
        model.subparam_replace_or_insert("-vf", "scale", Some("640:480"));
        // setdar has no ordering constraint against scale, so scale inserts
        // at the latest legal position: the end.
        assert_eq!(
            model.parameter_value("-vf"),
            Some("crop=720:480:0:0,setdar=16/9,scale=640:480")
        );
    }

    #[test]
    fn test_subparam_replace_keeps_position() {
        let mut model =
            ParameterModel::from_fragment("-vf crop=720:480:0:0,scale=640:480", FFMPEG_CHAINS);
        model.subparam_replace_or_insert("-vf", "crop", Some("704:464:8:8"));
        assert_eq!(
            model.parameter_value("-vf"),
            Some("crop=704:464:8:8,scale=640:480")
        );
    }

    #[test]
    fn test_subparam_delete_last_removes_parameter() {
        let mut model = ParameterModel::from_fragment("-i in.ts -vf yadif -y", FFMPEG_CHAINS);
        assert!(model.subparam_delete("-vf", "yadif"));
        assert!(!model.has_parameter("-vf"));
        assert_eq!(model.to_arg_string(), "-i in.ts -y");
    }

    #[test]
    fn test_subparam_delete_keeps_others() {
        let mut model = ParameterModel::from_fragment(
            "-vf crop=720:480:0:0,scale=640:480,yadif",
            FFMPEG_CHAINS,
        );
        assert!(model.subparam_delete("-vf", "scale"));
        assert_eq!(model.parameter_value("-vf"), Some("crop=720:480:0:0,yadif"));
        assert!(!model.subparam_delete("-vf", "scale"));
    }

    #[test]
    fn test_colon_separated_chain() {
        let mut model = ParameterModel::from_fragment(
            "-lavcopts vcodec=mpeg4:vbitrate=1800",
            MENCODER_CHAINS,
        );
        assert_eq!(
            model.subparam_value("-lavcopts", "vbitrate").as_deref(),
            Some("1800")
        );

        model.subparam_replace_or_insert("-lavcopts", "vbitrate", Some("2400"));
        model.subparam_replace_or_insert("-lavcopts", "vpass", Some("1"));
        assert_eq!(
            model.parameter_value("-lavcopts"),
            Some("vcodec=mpeg4:vbitrate=2400:vpass=1")
        );
    }

    #[test]
    fn test_valueless_subparam_value_is_empty_string() {
        let model = ParameterModel::from_fragment("-vf yadif", FFMPEG_CHAINS);
        assert_eq!(model.subparam_value("-vf", "yadif").as_deref(), Some(""));
        assert_eq!(model.subparam_value("-vf", "crop"), None);
    }

    #[test]
    fn test_substitute_tokens() {
        let mut model = ParameterModel::from_fragment(
            "-i <source> -metadata comment=<source_noext>",
            FFMPEG_CHAINS,
        );
        model.substitute_tokens(&[
            ("<source>", "/in/show.ts"),
            ("<source_noext>", "/in/show"),
        ]);
        assert_eq!(
            model.to_arg_string(),
            "-i /in/show.ts -metadata comment=/in/show"
        );
    }

    #[test]
    fn test_map_helpers() {
        let mut model = ParameterModel::from_fragment(
            "-map <video> -map <audio> -map <subtitle> -c copy",
            FFMPEG_CHAINS,
        );
        model.map_pair_values("-map", |v| match v {
            "<video>" => "0:0".to_string(),
            "<audio>" => "0:1".to_string(),
            other => other.to_string(),
        });
        model.retain_pairs("-map", |v| v != "<subtitle>");
        assert_eq!(model.to_arg_string(), "-map 0:0 -map 0:1 -c copy");
    }

    #[test]
    fn test_split_args_quotes_and_whitespace() {
        assert_eq!(
            split_args("  -i  \"my file.ts\"   -vf crop=1:2  "),
            vec!["-i", "my file.ts", "-vf", "crop=1:2"]
        );
        assert_eq!(
            split_args("-sub 'a b.srt' -y"),
            vec!["-sub", "a b.srt", "-y"]
        );
        assert!(split_args("").is_empty());
    }

    #[test]
    fn test_to_args_splits_pairs() {
        let model = ParameterModel::from_fragment("-i in.ts -y -b 1500k", FFMPEG_CHAINS);
        assert_eq!(model.to_args(), vec!["-i", "in.ts", "-y", "-b", "1500k"]);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        // parameter_replace_or_insert is idempotent: applying the same
        // replacement twice yields a string identical to applying it once.
        #[test]
        fn prop_replace_or_insert_idempotent(
            key in "-[a-z]{1,8}",
            value in "[a-z0-9:=]{1,12}",
            fragment in "(-[a-z]{1,6} [a-z0-9]{1,6} ?){0,4}",
        ) {
            let mut once = ParameterModel::from_fragment(&fragment, FFMPEG_CHAINS);
            once.parameter_replace_or_insert(&key, &value);
            let after_once = once.to_arg_string();

            once.parameter_replace_or_insert(&key, &value);
            let after_twice = once.to_arg_string();

            prop_assert_eq!(after_once, after_twice);
        }

        // In any insertion order, crop serializes before scale.
        #[test]
        fn prop_crop_always_precedes_scale(order in proptest::bool::ANY) {
            let mut model = ParameterModel::new(FFMPEG_CHAINS);
            if order {
                model.subparam_replace_or_insert("-vf", "crop", Some("720:480:0:0"));
                model.subparam_replace_or_insert("-vf", "scale", Some("640:480"));
            } else {
                model.subparam_replace_or_insert("-vf", "scale", Some("640:480"));
                model.subparam_replace_or_insert("-vf", "crop", Some("720:480:0:0"));
            }

            let chain = model.parameter_value("-vf").expect("chain exists").to_string();
            let crop_pos = chain.find("crop").expect("crop present");
            let scale_pos = chain.find("scale").expect("scale present");
            prop_assert!(crop_pos < scale_pos);
        }

        // After any sequence of sub-parameter mutations the chain never
        // contains empty segments and never leaves a dangling key.
        #[test]
        fn prop_no_dangling_separators(
            ops in proptest::collection::vec(
                (0usize..5, proptest::bool::ANY),
                1..20,
            ),
        ) {
            let names = ["crop", "scale", "yadif", "fieldmatch", "hqdn3d"];
            let mut model = ParameterModel::new(FFMPEG_CHAINS);

            for (name_idx, insert) in ops {
                let name = names[name_idx];
                if insert {
                    model.subparam_replace_or_insert("-vf", name, Some("1"));
                } else {
                    model.subparam_delete("-vf", name);
                }
            }

            match model.parameter_value("-vf") {
                Some(chain) => {
                    prop_assert!(!chain.is_empty(), "chain parameter left empty");
                    prop_assert!(!chain.starts_with(','), "leading separator in {}", chain);
                    prop_assert!(!chain.ends_with(','), "trailing separator in {}", chain);
                    prop_assert!(!chain.contains(",,"), "double separator in {}", chain);
                }
                None => {
                    // Deleted entirely: the serialized line must not mention it.
                    prop_assert!(!model.to_arg_string().contains("-vf"));
                }
            }
        }
    }
}
