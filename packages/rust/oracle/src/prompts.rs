//! Prompt text and response schemas sent to the classification oracle.

use serde_json::{Value, json};

/// Relevance prompt: buyer profile, a bounded window of document text and the answer format.
pub(crate) fn relevance(company_profile: &str, text: &str, window_chars: usize) -> String {
    let window: String = text.chars().take(window_chars).collect();
    format!(
        r#"{company_profile}

TENDER DOCUMENT TEXT:
{window}

TASK:
Analyze if this tender is relevant for the company based on the profile above.

Return ONLY a JSON object:
{{
    "is_relevant": true/false,
    "reasoning": "Brief explanation why this is relevant or not relevant",
    "confidence": "high/medium/low"
}}
"#
    )
}

pub(crate) const FORM_DETECTION: &str = r#"You are analyzing a tender/procurement PDF document. Your task is to find ALL sections that bidders need to fill, respond to, or submit.

TYPES OF FORMS TO DETECT:

1. TRADITIONAL FORMS:
   - Has titles like "ANNEXURE-I", "ANNEXURE-II", "TECHNICAL BID", "FINANCIAL BID"
   - Contains blank fields, tables, checkboxes to fill
   - Ends with signature/seal/date blocks

2. GeM/GOVERNMENT TENDER DOCUMENTS:
   - "Additional Qualification/Data Required" sections
   - "Technical Specifications" sections that need bidder response
   - "Buyer Added Bid Specific Terms" requiring acceptance/compliance
   - "Document required from seller" sections
   - Any section requiring bidder to submit documents or information

3. COMPLIANCE SECTIONS:
   - Eligibility criteria requiring documentation
   - Experience criteria sections
   - Financial standing requirements
   - Technical qualification parameters
   - Pre-bid requirements

4. SUBMISSION REQUIREMENTS:
   - EMD (Earnest Money Deposit) details
   - ePBG (e-Performance Bank Guarantee) details
   - Certificate requirements
   - Undertaking requirements

FOR EACH FORM/SECTION FOUND:
1. Identify the exact title or heading
2. Determine start and end page numbers (1-indexed, inclusive)
3. Assess confidence level (high/medium/low)

IMPORTANT:
- If document is a GeM tender, extract key sections as separate "forms"
- Even if there are no traditional blank forms, extract sections requiring bidder action
- Look for any section with headings indicating bidder requirements

Return JSON with ALL forms/sections found."#;

pub(crate) const DEADLINE: &str = r#"You are analyzing a tender/procurement document. Find the tender submission deadline.

Look for phrases like:
- "Last date of submission"
- "Bid closing date"
- "Tender closing date"
- "Deadline for submission"
- "Submit by"
- "Due date"
- "Bid opening date"

Extract the exact date mentioned.

Return JSON describing the deadline."#;

/// `responseSchema` for form detection.
pub(crate) fn forms_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "total_forms_found": { "type": "INTEGER" },
            "forms": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "form_title": { "type": "STRING" },
                        "start_page": { "type": "INTEGER" },
                        "end_page": { "type": "INTEGER" },
                        "confidence": { "type": "STRING", "enum": ["high", "medium", "low"] }
                    },
                    "required": ["form_title", "start_page", "end_page", "confidence"]
                }
            },
            "explanation": { "type": "STRING" }
        },
        "required": ["total_forms_found", "forms", "explanation"]
    })
}

/// `responseSchema` for deadline extraction.
pub(crate) fn deadline_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "deadline_found": { "type": "BOOLEAN" },
            "deadline_date": { "type": "STRING", "nullable": true },
            "bid_opening_date": { "type": "STRING", "nullable": true },
            "deadline_text": { "type": "STRING", "nullable": true },
            "explanation": { "type": "STRING" }
        },
        "required": ["deadline_found", "explanation"]
    })
}

/// Strip Markdown code fences the oracle sometimes wraps JSON answers in.
pub(crate) fn strip_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    body.strip_suffix("```").unwrap_or(body).trim()
}
