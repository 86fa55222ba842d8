//! Prompt assembly for the captioning and explanation calls.

/// Instruction sent alongside the image bytes to the vision model.
pub const CAPTION_INSTRUCTION: &str =
    "Describe this medical image in simple, reassuring terms for a patient.";

/// Build the explanation prompt from a caption and cleaned report text.
///
/// The generated answer must always carry the same two sections, so the
/// section labels are spelled out rather than left to the model.
pub fn explanation_prompt(caption: &str, ocr_text: &str) -> String {
    format!(
        "You are a friendly doctor explaining a medical report to a patient.\n\
         Respond with exactly two sections, using these exact headings.\n\
         \n\
         Explanation:\n\
         Explain what the image and report text show, in simple, kind,\n\
         reassuring language addressed directly to the patient.\n\
         \n\
         Precautions:\n\
         Give a numbered list of 2-3 short care tips.\n\
         \n\
         IMAGE DESCRIPTION:\n\
         {caption}\n\
         \n\
         REPORT TEXT:\n\
         {ocr_text}"
    )
}
