//! Embedded builtin-action catalog: the default contents of a
//! [`RegistrySnapshot`](super::RegistrySnapshot) when no schema files are
//! loaded. Schema files layer skills/attributes/events on top; the action
//! table itself ships with the binary.

use std::collections::{HashMap, HashSet};

use super::{
    BuiltinAction, ObjectShape, ParamConstraint, ShapeId, ShapeProperty, ValueType,
};

struct ActionSpec {
    name: &'static str,
    syntax: &'static str,
    doc: &'static str,
    required: &'static [&'static str],
    optional: &'static [&'static str],
    variadic: bool,
}

const fn fixed(
    name: &'static str,
    syntax: &'static str,
    doc: &'static str,
    required: &'static [&'static str],
    optional: &'static [&'static str],
) -> ActionSpec {
    ActionSpec { name, syntax, doc, required, optional, variadic: false }
}

const fn variadic(
    name: &'static str,
    syntax: &'static str,
    doc: &'static str,
    required: &'static [&'static str],
    optional: &'static [&'static str],
) -> ActionSpec {
    ActionSpec { name, syntax, doc, required, optional, variadic: true }
}

#[rustfmt::skip]
const ACTIONS: &[ActionSpec] = &[
    // Messaging
    fixed("SendMessage", "SendMessage(message, actorIds?, useFilter?)",
        "Send a message to one or more actors",
        &["message"], &["actorIds", "useFilter"]),
    variadic("SendCommand", "SendCommand(commandIdn, integrationIdn, connectorIdn, **args)",
        "Execute a command on an external connector",
        &["commandIdn", "integrationIdn", "connectorIdn"], &[]),
    variadic("SendSystemEvent", "SendSystemEvent(eventIdn, **arguments)",
        "Broadcast an internal system event",
        &["eventIdn"], &[]),
    fixed("SendTypingStart", "SendTypingStart(actorIds?)",
        "Show a typing indicator", &[], &["actorIds"]),
    fixed("SendTypingStop", "SendTypingStop(actorIds?)",
        "Hide the typing indicator", &[], &["actorIds"]),

    // Variables and state
    fixed("Set", "Set(name, value, expose?)",
        "Assign a local variable",
        &["name", "value"], &["expose"]),
    fixed("GetState", "GetState(name)",
        "Read a persistent state value", &["name"], &[]),
    fixed("SetState", "SetState(name, value)",
        "Write a persistent state value", &["name", "value"], &[]),
    fixed("IsGlobal", "IsGlobal(name)",
        "Test whether a variable is global", &["name"], &[]),

    // Attributes
    fixed("GetCustomerAttribute", "GetCustomerAttribute(field)",
        "Read a customer attribute", &["field"], &[]),
    fixed("SetCustomerAttribute", "SetCustomerAttribute(field, value)",
        "Write a customer attribute", &["field", "value"], &[]),
    fixed("DeleteCustomerAttribute", "DeleteCustomerAttribute(field)",
        "Delete a customer attribute", &["field"], &[]),
    fixed("GetCustomerMetadataAttribute", "GetCustomerMetadataAttribute(idn)",
        "Read customer attribute metadata", &["idn"], &[]),
    fixed("SetCustomerMetadataAttribute", "SetCustomerMetadataAttribute(idn, field, value)",
        "Write customer attribute metadata", &["idn", "field", "value"], &[]),
    fixed("GetProjectAttribute", "GetProjectAttribute(field)",
        "Read a project attribute", &["field"], &[]),
    fixed("SetProjectAttribute", "SetProjectAttribute(field, value)",
        "Write a project attribute", &["field", "value"], &[]),
    fixed("SetProjectMetadataAttribute", "SetProjectMetadataAttribute(idn, field, value)",
        "Write project attribute metadata", &["idn", "field", "value"], &[]),
    fixed("GetPersonaAttribute", "GetPersonaAttribute(id, field)",
        "Read a persona attribute", &["id", "field"], &[]),
    fixed("SetPersonaAttribute", "SetPersonaAttribute(id, field, value)",
        "Write a persona attribute", &["id", "field", "value"], &[]),
    fixed("DeletePersonaAttribute", "DeletePersonaAttribute(id, field)",
        "Delete a persona attribute", &["id", "field"], &[]),

    // Connectors and webhooks
    fixed("GetConnectorInfo", "GetConnectorInfo(integrationIdn, connectorIdn, field?)",
        "Read connector configuration",
        &["integrationIdn", "connectorIdn"], &["field"]),
    fixed("SetConnectorInfo", "SetConnectorInfo(integrationIdn, connectorIdn, field, value)",
        "Write a connector configuration field",
        &["integrationIdn", "connectorIdn", "field", "value"], &[]),
    fixed("CreateConnector", "CreateConnector(integrationIdn, connectorIdn, title, settings?, start?)",
        "Create a connector instance",
        &["integrationIdn", "connectorIdn", "title"], &["settings", "start"]),
    fixed("DeleteConnector", "DeleteConnector(integrationIdn, connectorIdn)",
        "Delete a connector instance", &["integrationIdn", "connectorIdn"], &[]),
    fixed("GetWebhook", "GetWebhook(webhookIdn, webhookType)",
        "Read a webhook configuration", &["webhookIdn", "webhookType"], &[]),
    fixed("CreateWebhook", "CreateWebhook(webhookIdn, webhookType, url?, headers?, body?)",
        "Create a webhook",
        &["webhookIdn", "webhookType"], &["url", "headers", "body"]),
    fixed("DeleteWebhook", "DeleteWebhook(webhookIdn, webhookType)",
        "Delete a webhook", &["webhookIdn", "webhookType"], &[]),

    // Personas and actors
    fixed("CreatePersona", "CreatePersona(name)",
        "Create a persona", &["name"], &[]),
    fixed("CreateActor", "CreateActor(integrationIdn, connectorIdn, externalId, personaId)",
        "Create an actor",
        &["integrationIdn", "connectorIdn", "externalId", "personaId"], &[]),
    fixed("GetActors", "GetActors(integrationIdn?, connectorIdn?, personaId?, externalId?)",
        "List actor ids matching a filter",
        &[], &["integrationIdn", "connectorIdn", "personaId", "externalId"]),
    fixed("GetActor", "GetActor(field?, id?)",
        "Read an actor field", &[], &["field", "id"]),
    fixed("GetUser", "GetUser(field?)",
        "Read the current user or one of its fields", &[], &["field"]),
    fixed("UpdateUser", "UpdateUser(value, field?, name?)",
        "Update a user field", &["value"], &["field", "name"]),
    fixed("GetAgentPersona", "GetAgentPersona(field?)",
        "Read the agent persona", &[], &["field"]),
    fixed("GetAgent", "GetAgent(idn?, field?)",
        "Read agent information", &[], &["idn", "field"]),
    fixed("GetCustomerInfo", "GetCustomerInfo(field?)",
        "Read customer contact information", &[], &["field"]),
    fixed("GetCustomer", "GetCustomer(field?)",
        "Read customer data", &[], &["field"]),
    fixed("SetCustomerInfo", "SetCustomerInfo(organizationName?)",
        "Update customer information", &[], &["organizationName"]),

    // Generation
    fixed("Gen", "Gen(name?, temperature?, topP?, maxTokens?, jsonSchema?, validateSchema?, skipFilter?, thinkingBudget?)",
        "Generate content with the configured model",
        &[], &["name", "temperature", "topP", "maxTokens", "jsonSchema",
               "validateSchema", "skipFilter", "thinkingBudget"]),
    fixed("GenStream", "GenStream(temperature?, topP?, maxTokens?, skipFilter?, sendTo?, actorIds?, interruptMode?, interruptWindow?, thinkingBudget?)",
        "Generate and stream content to actors",
        &[], &["temperature", "topP", "maxTokens", "skipFilter", "sendTo",
               "actorIds", "interruptMode", "interruptWindow", "thinkingBudget"]),
    fixed("FastPrompt", "FastPrompt(prompt?, temperature?, maxTokens?)",
        "One-shot prompt against the fast model",
        &[], &["prompt", "temperature", "maxTokens"]),

    // Memory and acts
    fixed("GetMemory", "GetMemory(fromPerson?, offset?, count?, maxLen?, asEnglishText?, summarize?, filterByActorIds?, fromDate?, toDate?)",
        "Read conversation history",
        &[], &["fromPerson", "offset", "count", "maxLen", "asEnglishText",
               "summarize", "filterByActorIds", "fromDate", "toDate"]),
    fixed("GetTriggeredAct", "GetTriggeredAct()",
        "Read the event that triggered this skill", &[], &[]),
    fixed("GetAct", "GetAct(id, fields?)",
        "Read an act by id", &["id"], &["fields"]),
    fixed("CreateMessageAct", "CreateMessageAct(text, from?, userPersonaId?, userActorId?)",
        "Inject a message act into the conversation",
        &["text"], &["from", "userPersonaId", "userActorId"]),
    fixed("GetCurrentPrompt", "GetCurrentPrompt()",
        "Read the active prompt template", &[], &[]),

    // Control flow
    fixed("Return", "Return(val?)",
        "Terminate skill execution, optionally with a value", &[], &["val"]),
    variadic("Do", "Do(action, **kwargs)",
        "Invoke an action or skill by name", &["action"], &[]),
    fixed("DUMMY", "DUMMY(message?)",
        "No-op placeholder", &[], &["message"]),
    fixed("Sleep", "Sleep(duration, interruptible?)",
        "Pause execution", &["duration"], &["interruptible"]),
    fixed("StartNotInterruptibleBlock", "StartNotInterruptibleBlock()",
        "Begin a non-interruptible section", &[], &[]),
    fixed("StopNotInterruptibleBlock", "StopNotInterruptibleBlock()",
        "End a non-interruptible section", &[], &[]),
    fixed("DisableFollowUp", "DisableFollowUp()",
        "Suppress automatic follow-ups", &[], &[]),
    fixed("EnableFollowUp", "EnableFollowUp()",
        "Re-enable automatic follow-ups", &[], &[]),

    // Strings, JSON, misc
    variadic("Concat", "Concat(*arguments)",
        "Concatenate values into a string", &[], &[]),
    variadic("Stringify", "Stringify(value)",
        "Render a value as a string", &[], &["value"]),
    fixed("IsEmpty", "IsEmpty(text)",
        "Test whether a value is empty", &["text"], &[]),
    fixed("IsSimilar", "IsSimilar(val1, val2, strategy?, threshold?)",
        "Fuzzy-compare two strings",
        &["val1", "val2"], &["strategy", "threshold"]),
    fixed("GetValueJSON", "GetValueJSON(obj, key)",
        "Extract a value from a JSON object", &["obj", "key"], &[]),
    fixed("UpdateValueJSON", "UpdateValueJSON(obj, key, value)",
        "Update a value in a JSON object", &["obj", "key", "value"], &[]),
    variadic("CreateArray", "CreateArray(*items)",
        "Build an array from its arguments", &[], &["items"]),
    fixed("GetIndexesOfItemsArrayJSON", "GetIndexesOfItemsArrayJSON(array, filterPath)",
        "Find indexes of matching array items", &["array", "filterPath"], &[]),
    fixed("GetItemsArrayByIndexesJSON", "GetItemsArrayByIndexesJSON(array, indexes)",
        "Select array items by index", &["array", "indexes"], &[]),
    fixed("AppendItemsArrayJSON", "AppendItemsArrayJSON(array, items)",
        "Append items to a JSON array", &["array", "items"], &[]),
    fixed("AsStringJSON", "AsStringJSON(val)",
        "Serialize a value to a JSON string", &["val"], &[]),
    variadic("GetRandomChoice", "GetRandomChoice(array)",
        "Pick a random element", &[], &["array"]),
    fixed("GetDateTime", "GetDateTime(format?, timezone?, weekday?)",
        "Current date/time, formatted", &[], &["format", "timezone", "weekday"]),
    fixed("GetDatetime", "GetDatetime(format?, timezone?, weekday?)",
        "Current date/time, formatted", &[], &["format", "timezone", "weekday"]),
    fixed("GetDateInterval", "GetDateInterval(start, offset)",
        "Date arithmetic", &["start", "offset"], &[]),

    // Knowledge base
    fixed("SearchFuzzyAkb", "SearchFuzzyAkb(query, searchFields?, fromPerson?, numberTopics?)",
        "Fuzzy-search the knowledge base",
        &["query"], &["searchFields", "fromPerson", "numberTopics"]),
    fixed("DeleteAkb", "DeleteAkb(ids)",
        "Delete knowledge base topics", &["ids"], &[]),
    fixed("UpdateAkb", "UpdateAkb(id, summary?, facts?, name?, source?, labels?)",
        "Update a knowledge base topic",
        &["id"], &["summary", "facts", "name", "source", "labels"]),
    fixed("SetManualAkb", "SetManualAkb(personaId, summary?, facts?, name?, source?, labels?)",
        "Write a manual knowledge base topic",
        &["personaId"], &["summary", "facts", "name", "source", "labels"]),

    // Sessions and errors
    fixed("GetSessionInfo", "GetSessionInfo()",
        "Read session information", &[], &[]),
    fixed("Error", "Error(message)",
        "Raise a skill error", &["message"], &[]),
    fixed("ResultError", "ResultError(message?, code?)",
        "Return an error result", &[], &["message", "code"]),
    fixed("ConnectorResultError", "ConnectorResultError(message?, connectorIdn?, integrationIdn?)",
        "Return a connector error result",
        &[], &["message", "connectorIdn", "integrationIdn"]),
];

struct ConstraintSpec {
    action: &'static str,
    param: &'static str,
    allowed: &'static [&'static str],
    min: Option<f64>,
    max: Option<f64>,
}

const CONSTRAINTS: &[ConstraintSpec] = &[
    ConstraintSpec {
        action: "IsSimilar",
        param: "threshold",
        allowed: &[],
        min: Some(0.0),
        max: Some(1.0),
    },
    ConstraintSpec {
        action: "IsSimilar",
        param: "strategy",
        allowed: &["hamming", "levenshtein", "symbols"],
        min: None,
        max: None,
    },
    ConstraintSpec {
        action: "GetDateTime",
        param: "format",
        allowed: &["datetime", "date", "time"],
        min: None,
        max: None,
    },
    ConstraintSpec {
        action: "GetDatetime",
        param: "format",
        allowed: &["datetime", "date", "time"],
        min: None,
        max: None,
    },
    ConstraintSpec {
        action: "GetMemory",
        param: "fromPerson",
        allowed: &["User", "Agent", "Both"],
        min: None,
        max: None,
    },
    ConstraintSpec {
        action: "SearchFuzzyAkb",
        param: "fromPerson",
        allowed: &["Agent", "User", "Both"],
        min: None,
        max: None,
    },
    ConstraintSpec {
        action: "GetWebhook",
        param: "webhookType",
        allowed: &["incoming", "outgoing"],
        min: None,
        max: None,
    },
    ConstraintSpec {
        action: "CreateWebhook",
        param: "webhookType",
        allowed: &["incoming", "outgoing"],
        min: None,
        max: None,
    },
    ConstraintSpec {
        action: "DeleteWebhook",
        param: "webhookType",
        allowed: &["incoming", "outgoing"],
        min: None,
        max: None,
    },
    ConstraintSpec {
        action: "CreateMessageAct",
        param: "from",
        allowed: &["user", "agent"],
        min: None,
        max: None,
    },
    ConstraintSpec {
        action: "Sleep",
        param: "interruptible",
        allowed: &["True", "False", "y", "n"],
        min: None,
        max: None,
    },
];

pub(super) fn default_actions() -> Vec<BuiltinAction> {
    ACTIONS
        .iter()
        .map(|spec| BuiltinAction {
            name: spec.name.to_string(),
            syntax: spec.syntax.to_string(),
            doc: spec.doc.to_string(),
            required_params: spec.required.iter().map(|p| p.to_string()).collect(),
            optional_params: spec.optional.iter().map(|p| p.to_string()).collect(),
            variadic: spec.variadic,
            constraints: CONSTRAINTS
                .iter()
                .filter(|c| c.action == spec.name)
                .map(|c| ParamConstraint {
                    param: c.param.to_string(),
                    allowed: c.allowed.iter().map(|v| v.to_string()).collect(),
                    min: c.min,
                    max: c.max,
                })
                .collect(),
        })
        .collect()
}

/// Actions that return nothing useful; assigning their result is reported.
pub(super) fn default_void_actions() -> HashSet<String> {
    [
        "SendMessage",
        "SetState",
        "Sleep",
        "Return",
        "SetCustomerAttribute",
        "SetProjectAttribute",
        "SetCustomerMetadataAttribute",
        "SetProjectMetadataAttribute",
        "DeleteCustomerAttribute",
        "DeletePersonaAttribute",
        "DeleteConnector",
        "DeleteAkb",
        "SendTypingStart",
        "SendTypingStop",
        "DisableFollowUp",
        "EnableFollowUp",
        "SetConnectorInfo",
        "SetPersonaAttribute",
        "SendSystemEvent",
        "SendCommand",
        "DUMMY",
        "StartNotInterruptibleBlock",
        "StopNotInterruptibleBlock",
    ]
    .into_iter()
    .map(str::to_string)
    .collect()
}

fn shape(
    name: &'static str,
    doc: &'static str,
    props: &[(&'static str, &'static str, &'static str)],
) -> ObjectShape {
    ObjectShape {
        name,
        doc,
        properties: props
            .iter()
            .map(|&(name, type_name, doc)| ShapeProperty { name, type_name, doc })
            .collect(),
    }
}

pub(super) fn default_shapes() -> Vec<ObjectShape> {
    vec![
        shape("User", "User returned by GetUser()", &[
            ("id", "string", "User UUID"),
            ("name", "string", "Display name"),
            ("title", "string", "Title"),
            ("email", "string", "Email address"),
            ("phone", "string", "Phone number"),
            ("language", "string", "Language preference"),
            ("timezone", "string", "Timezone"),
        ]),
        shape("Actor", "Actor returned by GetActor() or elements of GetActors()", &[
            ("id", "string", "Actor UUID"),
            ("integrationIdn", "string", "Integration identifier"),
            ("connectorIdn", "string", "Connector identifier"),
            ("externalId", "string", "External system identifier"),
            ("name", "string", "Display name"),
            ("personaId", "string", "Associated persona UUID"),
        ]),
        shape("Act", "Act returned by GetTriggeredAct() or GetAct()", &[
            ("arguments", "object", "Event arguments"),
            ("name", "string", "Act name"),
            ("targetAction", "string", "Target action"),
        ]),
        shape("AgentPersona", "Persona returned by GetAgentPersona()", &[
            ("id", "string", "Persona UUID"),
            ("name", "string", "Display name"),
        ]),
        shape("SessionInfo", "Session returned by GetSessionInfo()", &[
            ("id", "string", "Session UUID"),
        ]),
        shape("AkbTopic", "Knowledge base topic from SearchFuzzyAkb() results", &[
            ("topicId", "string", "Topic UUID"),
            ("summary", "string", "Summary text"),
            ("facts", "string", "Facts content"),
            ("name", "string", "Topic name"),
            ("source", "string", "Topic source"),
            ("labels", "array", "Classification labels"),
        ]),
        shape("ConnectorInfo", "Connector returned by GetConnectorInfo()", &[
            ("integrationIdn", "string", "Integration identifier"),
            ("connectorIdn", "string", "Connector identifier"),
            ("title", "string", "Display title"),
            ("settings", "object", "Configuration settings"),
        ]),
        shape("AgentInfo", "Agent returned by GetAgent()", &[
            ("personaId", "string", "Agent persona UUID"),
            ("idn", "string", "Agent identifier"),
        ]),
        shape("CustomerInfo", "Customer contact info returned by GetCustomerInfo()", &[
            ("phoneNumber", "string", "Phone number"),
            ("email", "string", "Email address"),
            ("name", "string", "Display name"),
        ]),
        shape("Customer", "Customer returned by GetCustomer()", &[
            ("idn", "string", "Customer identifier"),
            ("email", "string", "Email address"),
        ]),
        shape("Webhook", "Webhook returned by GetWebhook()", &[
            ("webhookIdn", "string", "Webhook identifier"),
            ("webhookType", "string", "incoming or outgoing"),
            ("url", "string", "Webhook URL"),
            ("headers", "object", "HTTP headers"),
            ("body", "string", "Body template"),
        ]),
        shape("LoopContext", "For-loop context variable", &[
            ("index", "number", "Current iteration, 1-indexed"),
            ("index0", "number", "Current iteration, 0-indexed"),
            ("first", "boolean", "True on the first iteration"),
            ("last", "boolean", "True on the last iteration"),
            ("length", "number", "Total item count"),
            ("revindex", "number", "Iterations remaining, 1-indexed"),
            ("revindex0", "number", "Iterations remaining, 0-indexed"),
        ]),
    ]
}

pub(super) fn default_return_types(
    shape_ids: &HashMap<&'static str, ShapeId>,
) -> HashMap<String, ValueType> {
    let obj = |key: &str| ValueType::Object(shape_ids.get(key).copied().unwrap_or(ShapeId::UNKNOWN));
    let arr = |key: &str| ValueType::Array(shape_ids.get(key).copied().unwrap_or(ShapeId::UNKNOWN));

    let entries: Vec<(&str, ValueType)> = vec![
        // Objects
        ("GetUser", obj("User")),
        ("GetActor", obj("Actor")),
        ("GetTriggeredAct", obj("Act")),
        ("GetAct", obj("Act")),
        ("GetAgentPersona", obj("AgentPersona")),
        ("GetSessionInfo", obj("SessionInfo")),
        ("GetConnectorInfo", obj("ConnectorInfo")),
        ("GetAgent", obj("AgentInfo")),
        ("GetCustomerInfo", obj("CustomerInfo")),
        ("GetCustomer", obj("Customer")),
        ("GetWebhook", obj("Webhook")),
        ("CreateMessageAct", obj("Act")),
        ("CreateActor", obj("Actor")),
        // Arrays of objects
        ("GetActors", arr("Actor")),
        ("SearchFuzzyAkb", arr("AkbTopic")),
        // Strings
        ("SendMessage", ValueType::String),
        ("Concat", ValueType::String),
        ("Stringify", ValueType::String),
        ("GetCurrentPrompt", ValueType::String),
        ("GetMemory", ValueType::String),
        ("GetDateTime", ValueType::String),
        ("GetDatetime", ValueType::String),
        ("GetDateInterval", ValueType::String),
        ("AsStringJSON", ValueType::String),
        ("GetRandomChoice", ValueType::String),
        ("Gen", ValueType::String),
        ("GenStream", ValueType::String),
        ("FastPrompt", ValueType::String),
        // Booleans
        ("IsEmpty", ValueType::Boolean),
        ("IsSimilar", ValueType::Boolean),
        ("IsGlobal", ValueType::Boolean),
        // Shapeless arrays
        ("GetIndexesOfItemsArrayJSON", ValueType::Array(ShapeId::UNKNOWN)),
        ("GetItemsArrayByIndexesJSON", ValueType::Array(ShapeId::UNKNOWN)),
        ("CreateArray", ValueType::Array(ShapeId::UNKNOWN)),
        ("AppendItemsArrayJSON", ValueType::Array(ShapeId::UNKNOWN)),
        // Untyped
        ("GetState", ValueType::Any),
        ("GetCustomerAttribute", ValueType::Any),
        ("GetProjectAttribute", ValueType::Any),
        ("GetPersonaAttribute", ValueType::Any),
        ("GetValueJSON", ValueType::Any),
        ("UpdateValueJSON", ValueType::Any),
        ("Do", ValueType::Any),
    ];
    entries.into_iter().map(|(name, ty)| (name.to_string(), ty)).collect()
}
