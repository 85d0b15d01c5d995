/// Git prints `CONFLICT (<kind>): ...` for every conflicted path.
pub fn looks_like_merge_conflict(output: &str) -> bool {
    output.contains("CONFLICT")
}

/// The update changed the locked dependency set.
pub fn touched_dependency_manifest(output: &str) -> bool {
    output.contains("composer.lock")
}
