use url::Url;

/// Appends path segments to `base`, like joining filesystem paths.
///
/// A trailing slash on `base` does not produce an empty segment. Query and fragment are kept.
pub fn join_path<S: AsRef<str>>(base: &Url, segments: &[S]) -> Url {
    let mut url = base.clone();
    if let Ok(mut path) = url.path_segments_mut() {
        path.pop_if_empty()
            .extend(segments.iter().map(|s| s.as_ref().trim_matches('/')));
    }
    url
}
