/// Which whitespace separated token of a name is compared when sorting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    ByLastName,
    ByFirstName,
}

impl SortKey {
    pub fn label(&self) -> &'static str {
        match self {
            SortKey::ByLastName => "last name",
            SortKey::ByFirstName => "first name",
        }
    }

    fn token<'a>(&self, name: &'a str) -> &'a str {
        let mut tokens = name.split_whitespace();
        let token = match self {
            SortKey::ByLastName => tokens.next_back(),
            SortKey::ByFirstName => tokens.next(),
        };
        token.unwrap_or("")
    }
}

/// Re-orders the comma separated names of a cell and joins them with ", ".
///
/// Names are compared by their first or last token as is (case sensitive).
/// Equal tokens keep their input order. Empty segments produced by stray
/// commas are kept as empty names.
pub fn sort_names(cell: &str, key: SortKey) -> String {
    let mut names: Vec<(&str, &str)> = cell
        .split(',')
        .map(str::trim)
        .map(|name| (key.token(name), name))
        .collect();

    // sort_by is stable
    names.sort_by(|(a, _), (b, _)| a.cmp(b));

    names
        .into_iter()
        .map(|(_, name)| name)
        .collect::<Vec<&str>>()
        .join(", ")
}
