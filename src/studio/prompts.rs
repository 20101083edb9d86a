//! Instruction texts sent to the model for each mode.

use crate::image::AspectRatio;

pub(crate) fn fashion(fashion_type: &str, background: &str, ratio: AspectRatio) -> String {
    format!(
        "Create a new photo from the provided one. Dress the subject in \"{fashion_type}\" style \
         clothing and place them in this background: \"{background}\". Keep the subject's overall \
         look and pose from the original photo. The result must use a {ratio} aspect ratio."
    )
}

pub(crate) fn background(description: &str, ratio: AspectRatio) -> String {
    format!(
        "Separate the main subject of the provided photo from its background, then replace the \
         background with: \"{description}\". Match the lighting on the subject to the new scene so \
         the composite looks natural. The result must use a {ratio} aspect ratio."
    )
}

pub(crate) fn pose(hint: &str, variation: usize, total: usize, ratio: AspectRatio) -> String {
    let mut prompt = format!(
        "Study the person in the provided photo and create a new photo of them in a different, \
         professional fashion pose. Keep their exact appearance, their clothing and the original \
         background; only the pose changes. The result must use a {ratio} aspect ratio."
    );
    let hint = hint.trim();
    if hint.is_empty() {
        prompt.push_str(&format!(
            " Invent an original, striking pose. This is variation {variation} of {total}: use a \
             clearly different angle, stance or mood from any other variation."
        ));
    } else {
        prompt.push_str(&format!(
            " Take inspiration from: \"{hint}\". This is variation {variation} of {total}: read \
             that idea in its own way so it stands apart from the other variations."
        ));
    }
    prompt
}

pub(crate) fn expression(expression: &str, ratio: AspectRatio) -> String {
    format!(
        "Study the person in the provided photo and subtly change their facial expression to \
         '{expression}'. Change only the facial features that carry the expression. Keep their \
         identity, hair, clothing, head position and the background as they are. The result must \
         use a {ratio} aspect ratio."
    )
}

pub(crate) const UPSCALE: &str = "Upscale this image to a much higher resolution. Sharpen fine \
     detail, texture and clarity while keeping the composition and style exactly as they are.";

pub(crate) fn background_ideas(fashion_type: &str) -> String {
    format!(
        "Suggest 5 short, creative backgrounds (under 10 words each) for a \"{fashion_type}\" \
         photoshoot. Answer with a JSON array of strings, for example: \
         [\"Cosmic nebula\", \"Gothic library\", \"Neon-lit alley\"]"
    )
}

pub(crate) const BACKGROUND_IDEAS_FROM_IMAGE: &str = "Look at the subject, clothing and mood of \
     the person in this photo and suggest 5 short, creative backgrounds (under 10 words each) \
     that would suit them. Answer with a JSON array of strings.";

pub(crate) const POSE_IDEAS: &str = "Suggest 5 short, creative pose descriptions (under 10 words \
     each) for a fashion photoshoot. Answer with a JSON array of strings.";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pose_prompt_uses_hint_when_given() {
        let with_hint = pose("  leaning on a wall ", 2, 4, AspectRatio::Story);
        assert!(with_hint.contains("\"leaning on a wall\""));
        assert!(with_hint.contains("variation 2 of 4"));
        assert!(with_hint.contains("9:16"));

        let without = pose("   ", 1, 2, AspectRatio::Square);
        assert!(without.contains("Invent an original"));
        assert!(without.contains("variation 1 of 2"));
    }

    #[test]
    fn test_prompts_carry_ratio() {
        assert!(fashion("Streetwear", "Rooftop", AspectRatio::Portrait).contains("4:5"));
        assert!(background("Beach", AspectRatio::Landscape).contains("16:9"));
        assert!(expression("smiling", AspectRatio::StandardPortrait).contains("3:4"));
    }
}
