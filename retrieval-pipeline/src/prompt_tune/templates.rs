//! Templates used while tuning the indexing prompts.
//!
//! The three final prompts keep single-brace placeholders such as
//! `{input_text}` untouched; the index command fills those in at run time.

pub const DOMAIN: &str = "tune/domain";
pub const LANGUAGE: &str = "tune/language";
pub const PERSONA: &str = "tune/persona";
pub const ENTITY_TYPES: &str = "tune/entity_types";
pub const EXAMPLE: &str = "tune/example";
pub const REPORTER_ROLE: &str = "tune/reporter_role";
pub const ENTITY_EXTRACTION: &str = "tune/entity_extraction";
pub const ENTITY_SUMMARIZATION: &str = "tune/entity_summarization";
pub const COMMUNITY_SUMMARIZATION: &str = "tune/community_summarization";

pub const TUPLE_DELIMITER: &str = "<|>";
pub const RECORD_DELIMITER: &str = "##";
pub const COMPLETION_DELIMITER: &str = "<|COMPLETE|>";

pub static TUNER_SYSTEM_PROMPT: &str = "You are a prompt engineer preparing a knowledge graph \
indexing pipeline for a new corpus. Answer exactly in the requested format, without preamble.";

static DOMAIN_PROMPT: &str = r#"Describe the domain of the texts below in a few words.
Examples of domains: "Social studies", "Algorithmic analysis", "Medical science".

Text:
{{ documents }}

Domain:"#;

static LANGUAGE_PROMPT: &str = r#"Name the primary language of the texts below, for example
"English", "Spanish" or "Chinese". Reply with the language name only.

Text:
{{ documents }}

Language:"#;

static PERSONA_PROMPT: &str = r#"Write a two sentence persona for an expert who builds knowledge
graphs from texts in the domain "{{ domain }}". Start with "You are" and describe what the expert
pays attention to when identifying entities and their relations."#;

static ENTITY_TYPES_PROMPT: &str = r#"{{ persona }}

Identify the most relevant entity types for a knowledge graph built from the texts below, in the
domain "{{ domain }}". Prefer general types such as "organization" or "person" over very specific
ones. Reply with a single comma-separated list of lowercase entity types.

Text:
{{ documents }}

Entity types:"#;

static EXAMPLE_PROMPT: &str = r#"{{ persona }}

Extract every entity of the types [{{ entity_types|join(", ") }}] from the text below, together
with the relationships between them. Write the answer in {{ language }}.

Format each entity as
("entity"{{ tuple_delimiter }}<name>{{ tuple_delimiter }}<type>{{ tuple_delimiter }}<description>)
and each relationship as
("relationship"{{ tuple_delimiter }}<source>{{ tuple_delimiter }}<target>{{ tuple_delimiter }}<description>{{ tuple_delimiter }}<strength 1-10>)
Separate records with {{ record_delimiter }} and finish with {{ completion_delimiter }}.

Text:
{{ text }}

Output:"#;

static REPORTER_ROLE_PROMPT: &str = r#"{{ persona }}

Write a single sentence role description for an analyst who summarizes communities of related
entities from texts in the domain "{{ domain }}". Start with "You are".

Sample text:
{{ documents }}

Role:"#;

static ENTITY_EXTRACTION_PROMPT: &str = r#"-Goal-
Given a text document that is potentially relevant to this activity and a list of entity types,
identify all entities of those types from the text and all relationships among the identified
entities.

-Steps-
1. Identify all entities. For each identified entity, extract the following information:
- entity_name: Name of the entity, capitalized
- entity_type: One of the following types: [{{ entity_types|join(", ") }}]
- entity_description: Comprehensive description of the entity's attributes and activities
Format each entity as ("entity"{tuple_delimiter}<entity_name>{tuple_delimiter}<entity_type>{tuple_delimiter}<entity_description>)

2. From the entities identified in step 1, identify all pairs of (source_entity, target_entity)
that are clearly related to each other. For each pair, extract:
- source_entity, target_entity: names as identified in step 1
- relationship_description: why the two entities are related
- relationship_strength: an integer score between 1 and 10
Format each relationship as ("relationship"{tuple_delimiter}<source_entity>{tuple_delimiter}<target_entity>{tuple_delimiter}<relationship_description>{tuple_delimiter}<relationship_strength>)

3. Return output in {{ language }} as a single list of all the entities and relationships
identified in steps 1 and 2. Use {record_delimiter} as the list delimiter.

4. When finished, output {completion_delimiter}

-Examples-
######################
{% for example in examples %}
Example {{ loop.index }}:
{{ example.text }}
######################
Output:
{{ example.output }}
######################
{% endfor %}

-Real Data-
######################
entity_types: [{{ entity_types|join(", ") }}]
text: {input_text}
######################
output:"#;

static ENTITY_SUMMARIZATION_PROMPT: &str = r#"{{ persona }}
Using your expertise, you're asked to generate a comprehensive summary of the data provided below.
Given one or more entities and a list of descriptions, all related to the same entity or group of
entities, concatenate all of these into a single, concise description in {{ language }}. Make sure
to include information collected from all the descriptions. If the provided descriptions are
contradictory, resolve the contradictions and provide a single, coherent summary. Write in third
person and include the entity names so we have the full context.

#######
-Data-
Entities: {entity_name}
Description List: {description_list}
#######
Output:"#;

static COMMUNITY_SUMMARIZATION_PROMPT: &str = r#"{{ reporter_role }}

# Goal
Write a comprehensive assessment report of a community, given a list of entities that belong to
the community as well as their relationships and optional associated claims. The report will be
used to inform decision-makers about information associated with the community and its potential
impact. Write the report in {{ language }}.

# Report Structure
The report should include the following sections:
- TITLE: community's name that represents its key entities
- SUMMARY: an executive summary of the community's overall structure
- IMPACT SEVERITY RATING: a float score between 0-10 for the importance of the community
- RATING EXPLANATION: a single sentence explanation of the rating
- DETAILED FINDINGS: a list of 5-10 key insights about the community

Return output as a well-formed JSON-formatted string with the keys "title", "summary",
"rating", "rating_explanation" and "findings", where "findings" is a list of objects with the
keys "summary" and "explanation".

# Real Data
Text:
{input_text}

Output:"#;

pub static TUNE_TEMPLATES: &[(&str, &str)] = &[
    (DOMAIN, DOMAIN_PROMPT),
    (LANGUAGE, LANGUAGE_PROMPT),
    (PERSONA, PERSONA_PROMPT),
    (ENTITY_TYPES, ENTITY_TYPES_PROMPT),
    (EXAMPLE, EXAMPLE_PROMPT),
    (REPORTER_ROLE, REPORTER_ROLE_PROMPT),
    (ENTITY_EXTRACTION, ENTITY_EXTRACTION_PROMPT),
    (ENTITY_SUMMARIZATION, ENTITY_SUMMARIZATION_PROMPT),
    (COMMUNITY_SUMMARIZATION, COMMUNITY_SUMMARIZATION_PROMPT),
];
