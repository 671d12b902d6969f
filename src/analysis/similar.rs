//! Bounded-edit-distance name suggestions for typo diagnostics.

/// Classic Levenshtein distance over chars.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=a.len()).collect();
    let mut cur = vec![0usize; a.len() + 1];

    for (i, bc) in b.iter().enumerate() {
        cur[0] = i + 1;
        for (j, ac) in a.iter().enumerate() {
            let cost = usize::from(ac != bc);
            cur[j + 1] = (prev[j] + cost).min(cur[j] + 1).min(prev[j + 1] + 1);
        }
        std::mem::swap(&mut prev, &mut cur);
    }
    prev[a.len()]
}

/// Candidates within `max_distance` of `name`, compared lowercased,
/// closest first. Ties keep candidate order.
pub fn suggest<'a, I>(name: &str, candidates: I, max_distance: usize) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let lower = name.to_ascii_lowercase();
    let mut scored: Vec<(usize, &str)> = candidates
        .into_iter()
        .filter_map(|cand| {
            let d = levenshtein(&lower, &cand.to_ascii_lowercase());
            (d <= max_distance).then_some((d, cand))
        })
        .collect();
    scored.sort_by_key(|&(d, _)| d);
    scored.into_iter().map(|(_, cand)| cand.to_string()).collect()
}

/// Edit-distance budget for function and skill names.
pub const FUNCTION_DISTANCE: usize = 3;
/// Edit-distance budget for variable and parameter names.
pub const VARIABLE_DISTANCE: usize = 2;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_basics() {
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("same", "same"), 0);
    }

    #[test]
    fn suggestions_are_closest_first() {
        let names = ["SendMessage", "SendCommand", "GetMemory"];
        let got = suggest("SendMesage", names, FUNCTION_DISTANCE);
        assert_eq!(got[0], "SendMessage");
        assert!(!got.contains(&"GetMemory".to_string()));
    }

    #[test]
    fn comparison_ignores_case() {
        let got = suggest("sendmessage", ["SendMessage"], 0);
        assert_eq!(got, vec!["SendMessage"]);
    }
}
