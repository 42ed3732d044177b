// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

/// Spelling variants seen in exported event files, keyed by their lowercased form.
const CATEGORY_SYNONYMS: &[(&str, &str)] = &[
    ("contentinjection", "contentinjection"),
    ("content injection", "contentinjection"),
    ("content_injection", "contentinjection"),
    ("drivebycompromise", "drivebycompromise"),
    ("drive by compromise", "drivebycompromise"),
    ("drive-by-compromise", "drivebycompromise"),
    ("compromise (driveby)", "drivebycompromise"),
    ("exploitpublicfacingapplication", "exploitpublicfacingapplication"),
    ("exploit public facing", "exploitpublicfacingapplication"),
    ("explaoit-public facing", "exploitpublicfacingapplication"),
    ("externalremoteservices", "externalremoteservices"),
    ("external remote service", "externalremoteservices"),
    ("external-remote-service", "externalremoteservices"),
    ("phishing", "phishing"),
    ("phising", "phishing"),
    ("replicationthroughremovablemedia", "replicationthroughremovablemedia"),
    ("replication through removable media", "replicationthroughremovablemedia"),
    ("replication-through-removable-media", "replicationthroughremovablemedia"),
    ("supplychaincompromise", "supplychaincompromise"),
    ("supply chain compromise", "supplychaincompromise"),
    ("supply_chain_compromise", "supplychaincompromise"),
    ("trustedrelationship", "trustedrelationship"),
    ("trusted relationship", "trustedrelationship"),
    ("trusted-relationship", "trustedrelationship"),
    ("validaccounts", "validaccounts"),
    ("valid accounts", "validaccounts"),
    ("valid-accounts", "validaccounts"),
    ("valida_accounts", "validaccounts"),
];

/// Maps a free-text category to its canonical token. Unknown values come back trimmed and
/// lowercased; a blank input yields an empty string.
pub fn normalize_category(raw: &str) -> String {
    let normalized = raw.trim().to_lowercase();
    CATEGORY_SYNONYMS
        .iter()
        .find(|(variant, _)| *variant == normalized)
        .map(|(_, canonical)| canonical.to_string())
        .unwrap_or(normalized)
}
