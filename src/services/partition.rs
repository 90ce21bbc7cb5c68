use indexmap::IndexMap;

use crate::dao::models::Score;

/// Group scores by beatmap hash.
///
/// Groups appear in the order their hash is first seen and keep the relative order of their
/// scores, so the output is deterministic for a given input.
pub fn partition(scores: Vec<Score>) -> IndexMap<String, Vec<Score>> {
    let mut groups: IndexMap<String, Vec<Score>> = IndexMap::new();
    for score in scores {
        match groups.get_mut(&score.map_md5) {
            Some(group) => group.push(score),
            None => {
                groups.insert(score.map_md5.clone(), vec![score]);
            }
        }
    }
    groups
}
