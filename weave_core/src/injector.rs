use std::collections::HashMap;
use std::collections::HashSet;

use tracing::debug;
use tracing::trace;

use crate::TokenCollection;
use crate::WeaveError;
use crate::WeaveResult;
use crate::tokens::Offsets;
use crate::tokens::content_hash;

/// Rewrite `text`, replacing every resolved, not yet injected placeholder
/// occurrence with its value.
///
/// A running length delta maps offsets in `text` to positions in the output,
/// so values may be longer or shorter than their placeholders. Unresolved
/// placeholders are copied through verbatim and their offsets moved to where
/// they now sit in the output, so a later resolve and inject round on the
/// output stays correct.
///
/// With `check_hash`, `text` must hash to the collection's source hash, and
/// afterwards the source hash is updated to the output.
pub fn inject(
	text: &str,
	collection: &mut TokenCollection,
	check_hash: bool,
) -> WeaveResult<String> {
	if check_hash && collection.source_hash() != Some(content_hash(text)) {
		return Err(WeaveError::UnknownTokenSource);
	}

	let mut occurrences: Vec<(usize, usize)> = collection
		.iter()
		.enumerate()
		.filter(|(_, token)| !token.is_injected())
		.flat_map(|(index, token)| token.offsets.iter().map(move |&offset| (offset, index)))
		.collect();
	occurrences.sort_unstable();

	let tokens: Vec<_> = collection.iter().collect();
	let mut output = String::with_capacity(text.len());
	let mut last_offset = 0usize;
	let mut covered = 0usize;
	let mut delta = 0isize;
	let mut moved: HashMap<usize, Offsets> = HashMap::new();
	let mut injected: HashSet<usize> = HashSet::new();

	for (offset, index) in occurrences {
		let token = tokens[index];
		let end = offset + token.placeholder.len();

		if offset < covered || text.get(offset..end) != Some(token.placeholder.as_str()) {
			return Err(WeaveError::TokenOffsetMismatch {
				token: token.placeholder.clone(),
				offset,
			});
		}
		covered = end;

		let adjusted = offset.saturating_add_signed(delta);
		moved.entry(index).or_default().insert(adjusted);

		let Some(value) = token.value().filter(|_| token.is_resolved()) else {
			trace!(token = %token.placeholder, offset, "unresolved placeholder kept");
			continue;
		};

		output.push_str(&text[last_offset..offset]);
		output.push_str(value);
		last_offset = end;
		delta += value.len() as isize - token.placeholder.len() as isize;

		injected.insert(index);
	}

	output.push_str(&text[last_offset..]);

	for (index, token) in collection.iter_mut().enumerate() {
		if let Some(offsets) = moved.remove(&index) {
			token.offsets = offsets;
		}
		if injected.contains(&index) {
			token.mark_injected();
		}
	}

	debug!(
		injected = injected.len(),
		delta,
		"injected tokens"
	);

	if check_hash {
		collection.set_source_hash(Some(content_hash(&output)));
	}

	Ok(output)
}
