//! Natural-language task text for the collector.

use gradreach_shared::PipelineConfig;

/// Render the collection task sent with every request.
pub fn build_instructions(config: &PipelineConfig) -> String {
    format!(
        "You are collecting graduate student contacts for {university} ({department}).\n\
         1. Go to {url}\n\
         2. For the first {count} students on the page with a valid email address \
         (an email of \"None\" does not count):\n\
         \x20  - Extract their full name\n\
         \x20  - Extract their email address\n\
         \x20  - Continue with the next student\n\
         3. Only include emails ending in @{domain}.\n\
         4. Format the data as a JSON array of objects with this structure:\n\
         \x20  [{{\"name\": \"Student Name\", \"email\": \"student@{domain}\"}}, ...]\n\
         5. Return only the JSON array, with no commentary before or after it.",
        university = config.university,
        department = config.department,
        url = config.listing_url,
        count = config.max_count,
        domain = config.email_domain,
    )
}

/// Reviewer note attached to a re-collection request.
pub fn recollection_feedback(invalid: usize, total: usize, domain: &str) -> String {
    format!(
        "The previous attempt returned {invalid} of {total} entries with a missing name or an \
         email that is not a valid @{domain} address. Collect again and return only entries \
         with a complete name and an email ending in @{domain}."
    )
}
