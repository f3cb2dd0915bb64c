use std::time::Duration;

use serde_json::{json, Value};
use stream_protocol::{BlockEvent, BlockKind, Envelope, SourceLink, Tabs, ThoughtItem};

use crate::ScriptStep;

pub const INDICATOR_TITLE: &str = "Campaign Configuration";
pub const INDICATOR_DESCRIPTION: &str = "Generated campaign configuration";

struct CampaignTemplate {
    name: &'static str,
    audience: &'static str,
    channels: &'static [&'static str],
    message: &'static str,
    timing: &'static str,
    priority: &'static str,
    estimated_reach: u64,
}

const TEMPLATES: [CampaignTemplate; 3] = [
    CampaignTemplate {
        name: "Weekend Flash Sale",
        audience: "Cart abandoners in last 7 days",
        channels: &["Email", "SMS", "WhatsApp"],
        message: "Get 20% off before Sunday ends! Complete your purchase now.",
        timing: "2025-09-28T10:00:00Z",
        priority: "high",
        estimated_reach: 1200,
    },
    CampaignTemplate {
        name: "Holiday Collection Launch",
        audience: "High-value prospects",
        channels: &["Email", "Ads"],
        message: "Discover our exclusive holiday collection. Limited time offer!",
        timing: "2025-12-01T09:00:00Z",
        priority: "medium",
        estimated_reach: 450,
    },
    CampaignTemplate {
        name: "Loyalty Rewards Campaign",
        audience: "Repeat customers",
        channels: &["Email", "SMS"],
        message: "Thank you for your loyalty! Enjoy exclusive member benefits.",
        timing: "2025-10-15T14:00:00Z",
        priority: "low",
        estimated_reach: 850,
    },
];

/// Campaign name implied by keywords in a free-text query.
pub fn extract_campaign_name(query: &str) -> Option<&'static str> {
    let lowered = query.to_lowercase();
    let has = |needles: &[&str]| needles.iter().any(|needle| lowered.contains(needle));

    if has(&["flash sale", "sale"]) {
        return Some("Flash Sale Campaign");
    }
    if has(&["holiday", "christmas", "winter"]) {
        return Some("Holiday Campaign");
    }
    if has(&["loyalty", "reward"]) {
        return Some("Loyalty Rewards Campaign");
    }
    if has(&["welcome", "onboard"]) {
        return Some("Welcome Series Campaign");
    }
    if has(&["abandon", "cart"]) {
        return Some("Cart Recovery Campaign");
    }
    None
}

fn template_for(query: &str) -> &'static CampaignTemplate {
    let lowered = query.to_lowercase();
    if ["holiday", "christmas", "winter"]
        .iter()
        .any(|needle| lowered.contains(needle))
    {
        &TEMPLATES[1]
    } else if ["loyalty", "reward"]
        .iter()
        .any(|needle| lowered.contains(needle))
    {
        &TEMPLATES[2]
    } else {
        &TEMPLATES[0]
    }
}

fn campaign_value(request_id: u64, template: &CampaignTemplate, name: &str) -> Value {
    json!({
        "id": format!("campaign_{request_id}"),
        "name": name,
        "audience": template.audience,
        "channels": template.channels,
        "message": template.message,
        "timing": template.timing,
        "meta": {
            "priority": template.priority,
            "experiment_id": format!("exp_{request_id}"),
            "estimated_reach": template.estimated_reach,
        },
    })
}

/// Full campaign object the block script converges to for `query`.
pub fn campaign_for(request_id: u64, query: &str) -> Value {
    let template = template_for(query);
    let name = extract_campaign_name(query).unwrap_or(template.name);
    campaign_value(request_id, template, name)
}

/// Field-by-field producer: `start`, one `partial` per field with a growing
/// cumulative fragment, then `complete` carrying the whole campaign.
pub fn partial_field_script(request_id: u64, query: &str) -> Vec<ScriptStep> {
    let name = if query.to_lowercase().contains("flash") {
        TEMPLATES[0].name
    } else {
        TEMPLATES[1].name
    };
    let template = &TEMPLATES[0];
    let campaign = campaign_value(request_id, template, name);

    let mut steps = vec![ScriptStep::Envelope(Envelope::start(
        "Starting campaign generation...",
    ))];

    let mut cumulative = serde_json::Map::new();
    for (field, pause_ms) in [("name", 500), ("audience", 400), ("channels", 300), ("message", 600)] {
        let value = campaign[field].clone();
        cumulative.insert(field.to_owned(), value.clone());
        steps.push(ScriptStep::Pause(Duration::from_millis(pause_ms)));
        steps.push(ScriptStep::Envelope(Envelope::partial(
            field,
            value,
            json!({ "campaign": Value::Object(cumulative.clone()) }),
        )));
    }

    steps.push(ScriptStep::Pause(Duration::from_millis(300)));
    steps.push(ScriptStep::Envelope(Envelope::complete(Some(
        json!({ "campaign": campaign }),
    ))));
    steps
}

/// Block producer: reasoning tabs, paragraph, artifact streamed under one
/// indicator, then summary, suggestions, conclusion and `complete`.
pub fn block_script(request_id: u64, query: &str) -> Vec<ScriptStep> {
    let campaign = campaign_for(request_id, query);
    let name = campaign["name"].as_str().unwrap_or_default().to_owned();

    let mut steps = vec![
        ScriptStep::Envelope(Envelope::start("Generating your campaign configuration...")),
        ScriptStep::Envelope(Envelope::block(BlockEvent::new(BlockKind::Init))),
        ScriptStep::Envelope(Envelope::auxiliary(thoughts(&[
            "Reading the brief and extracting the goal",
            "Identifying the optimal audience segment",
        ]))),
        ScriptStep::Envelope(Envelope::block(BlockEvent::new(BlockKind::Para).with_content(
            "I'll help you create a targeted campaign. Based on your input, I'm generating a multi-channel campaign strategy.",
        ))),
        ScriptStep::Envelope(Envelope::block(
            BlockEvent::new(BlockKind::ArtifactStart)
                .with_indicator(INDICATOR_TITLE, INDICATOR_DESCRIPTION),
        )),
    ];

    for field in ["name", "audience", "channels", "message", "timing"] {
        steps.push(ScriptStep::Envelope(Envelope::block(
            BlockEvent::new(BlockKind::ArtifactChunk)
                .with_artifact(json!({ "campaign": { field: campaign[field].clone() } })),
        )));
    }

    steps.push(ScriptStep::Comment("keepalive".to_owned()));
    steps.push(ScriptStep::Envelope(
        Envelope::block(BlockEvent::new(BlockKind::ArtifactEnd).with_artifact(json!({
            "campaign": { "id": campaign["id"].clone(), "meta": campaign["meta"].clone() }
        })))
        .with_tabs(Tabs {
            thoughts: vec![ThoughtItem {
                text: "Finalizing campaign timing and automation settings".to_owned(),
                ts: None,
            }],
            sources: vec![
                SourceLink {
                    title: "Email benchmarks by industry".to_owned(),
                    url: "https://mailchimp.com/resources/email-marketing-benchmarks/".to_owned(),
                    source: Some("mailchimp.com".to_owned()),
                },
                SourceLink {
                    title: "SMS marketing timing guide".to_owned(),
                    url: "https://www.klaviyo.com/blog/sms-marketing-best-practices".to_owned(),
                    source: Some("klaviyo.com".to_owned()),
                },
            ],
            ..Tabs::default()
        }),
    ));

    steps.push(ScriptStep::Envelope(Envelope::auxiliary(Tabs {
        answer: Some(format!(
            "{name} targets {} across {} channels.",
            campaign["audience"].as_str().unwrap_or_default(),
            campaign["channels"].as_array().map(Vec::len).unwrap_or_default(),
        )),
        ..Tabs::default()
    })));
    steps.push(ScriptStep::Envelope(Envelope::block(
        BlockEvent::new(BlockKind::Summary)
            .with_content(format!("{name} is ready for review.")),
    )));
    steps.push(ScriptStep::Envelope(Envelope::block(
        BlockEvent::new(BlockKind::Suggestions).with_suggestions([
            "Add an A/B test on the subject line".to_owned(),
            "Schedule a reminder 24 hours later".to_owned(),
            "Exclude customers who purchased this week".to_owned(),
        ]),
    )));
    steps.push(ScriptStep::Envelope(Envelope::block(
        BlockEvent::new(BlockKind::Conclusion)
            .with_content("Review the configuration and launch when ready."),
    )));
    steps.push(ScriptStep::Envelope(Envelope::complete(None)));
    steps
}

fn thoughts(lines: &[&str]) -> Tabs {
    Tabs {
        thoughts: lines
            .iter()
            .map(|text| ThoughtItem {
                text: (*text).to_owned(),
                ts: None,
            })
            .collect(),
        ..Tabs::default()
    }
}

#[cfg(test)]
mod tests {
    use super::{block_script, campaign_for, extract_campaign_name, partial_field_script};
    use crate::ScriptStep;
    use stream_protocol::{BlockKind, EnvelopeBody};

    #[test]
    fn campaign_names_follow_query_keywords() {
        assert_eq!(
            extract_campaign_name("Flash SALE this weekend"),
            Some("Flash Sale Campaign")
        );
        assert_eq!(
            extract_campaign_name("christmas push"),
            Some("Holiday Campaign")
        );
        assert_eq!(
            extract_campaign_name("onboard new users"),
            Some("Welcome Series Campaign")
        );
        assert_eq!(
            extract_campaign_name("win back cart abandoners"),
            Some("Cart Recovery Campaign")
        );
        assert_eq!(extract_campaign_name("brand awareness"), None);
    }

    #[test]
    fn partial_script_names_flash_queries_weekend_flash_sale() {
        let steps = partial_field_script(1, "flash sale for cart abandoners");
        let fields: Vec<&str> = steps
            .iter()
            .filter_map(|step| match step {
                ScriptStep::Envelope(envelope) => match &envelope.body {
                    EnvelopeBody::Partial(partial) => Some(partial.field.as_str()),
                    _ => None,
                },
                _ => None,
            })
            .collect();
        assert_eq!(fields, vec!["name", "audience", "channels", "message"]);

        let Some(ScriptStep::Envelope(last)) = steps.last() else {
            panic!("script must end with an envelope");
        };
        let EnvelopeBody::Lifecycle(lifecycle) = &last.body else {
            panic!("script must end with a lifecycle envelope");
        };
        let data = lifecycle.data.as_ref().expect("complete carries data");
        assert_eq!(data["campaign"]["name"], "Weekend Flash Sale");
        assert_eq!(data["campaign"]["meta"]["estimated_reach"], 1200);
    }

    #[test]
    fn block_script_emits_exactly_one_artifact_start() {
        let starts = block_script(3, "holiday launch")
            .iter()
            .filter(|step| {
                matches!(step, ScriptStep::Envelope(envelope)
                    if matches!(&envelope.body, EnvelopeBody::Block(block) if block.kind == BlockKind::ArtifactStart))
            })
            .count();
        assert_eq!(starts, 1);
        assert_eq!(campaign_for(3, "holiday launch")["name"], "Holiday Campaign");
    }
}
