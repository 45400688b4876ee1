use super::timers_console::{add_event_listener, remove_event_listener};
use super::*;

pub(super) fn install(env: &mut HostEnvironmentEmulator<'_>) {
    let profile = env.rt.config.browser.clone();
    let document_url = env.rt.config.document_url.clone();

    install_element_proto(env);
    if let Some(document) = env.global_object("document", ObjectKind::Document) {
        install_document(env, &document, &profile, &document_url);
    }
    if let Some(location) = env.global_object("location", ObjectKind::Host) {
        install_location(env, &location, &document_url);
        let document = env.global().borrow().get_own("document").cloned();
        if let Some(Value::Object(document)) = document {
            env.value(&document, "location", "document.location", Value::Object(location));
        }
    }
    for name in ["localStorage", "sessionStorage"] {
        install_storage(env, name);
    }
    install_screen(env, &profile);
}

fn install_document(
    env: &mut HostEnvironmentEmulator<'_>,
    document: &ObjectRef,
    profile: &BrowserProfile,
    document_url: &str,
) {
    let domain = parse_url(document_url).hostname;
    let strings = [
        ("title", profile.document_title.as_str()),
        ("referrer", profile.document_referrer.as_str()),
        ("URL", document_url),
        ("documentURI", document_url),
        ("domain", domain.as_str()),
        ("characterSet", profile.character_set.as_str()),
        ("readyState", "loading"),
        ("compatMode", "CSS1Compat"),
    ];
    for (key, value) in strings {
        env.value(document, key, &format!("document.{key}"), Value::string(value));
    }
    env.rt.document.cookies = parse_cookie_header(&profile.document_cookie);

    for tag in ["html", "head", "body"] {
        let element = make_element(env.rt, tag);
        let key = match tag {
            "html" => "documentElement",
            other => other,
        };
        env.value(document, key, &format!("document.{key}"), Value::Object(element));
    }

    let methods: [(&str, NativeHandler); 10] = [
        ("write", document_write),
        ("writeln", document_writeln),
        ("createElement", create_element),
        ("getElementById", get_element_by_id),
        ("querySelector", query_selector),
        ("querySelectorAll", query_selector_all),
        ("getElementsByTagName", get_elements_by_tag_name),
        ("getElementsByClassName", get_elements_by_class_name),
        ("addEventListener", add_event_listener),
        ("removeEventListener", remove_event_listener),
    ];
    for (key, handler) in methods {
        env.method(document, key, &format!("document.{key}"), handler);
    }
}

fn install_element_proto(env: &mut HostEnvironmentEmulator<'_>) {
    let proto = env.realm().element_proto.clone();
    let methods: [(&str, NativeHandler); 8] = [
        ("setAttribute", set_attribute),
        ("getAttribute", get_attribute),
        ("removeAttribute", remove_attribute),
        ("hasAttribute", has_attribute),
        ("appendChild", append_child),
        ("removeChild", remove_child),
        ("addEventListener", element_listener_noop),
        ("removeEventListener", element_listener_noop),
    ];
    for (key, handler) in methods {
        env.method(&proto, key, &format!("Element.prototype.{key}"), handler);
    }
}

fn install_location(env: &mut HostEnvironmentEmulator<'_>, location: &ObjectRef, document_url: &str) {
    let parts = parse_url(document_url);
    let origin = format!("{}//{}", parts.protocol, parts.host);
    let fields = [
        ("href", document_url.to_string()),
        ("protocol", parts.protocol),
        ("host", parts.host),
        ("hostname", parts.hostname),
        ("port", parts.port),
        ("pathname", parts.pathname),
        ("search", parts.search),
        ("hash", parts.hash),
        ("origin", origin),
    ];
    for (key, value) in fields {
        env.value(location, key, &format!("location.{key}"), Value::string(value));
    }
    env.method(location, "toString", "location.toString", location_to_string);
    env.method(location, "assign", "location.assign", location_navigate);
    env.method(location, "replace", "location.replace", location_navigate);
    env.method(location, "reload", "location.reload", location_reload);
}

fn install_storage(env: &mut HostEnvironmentEmulator<'_>, name: &str) {
    let Some(storage) = env.global_object(name, ObjectKind::Storage(Vec::new())) else {
        return;
    };
    let proto = env.realm().storage_proto.clone();
    storage.borrow_mut().proto = Some(proto.clone());
    let methods: [(&str, NativeHandler); 5] = [
        ("getItem", storage_get_item),
        ("setItem", storage_set_item),
        ("removeItem", storage_remove_item),
        ("clear", storage_clear),
        ("key", storage_key),
    ];
    for (key, handler) in methods {
        env.method(&proto, key, &format!("Storage.prototype.{key}"), handler);
    }
}

fn install_screen(env: &mut HostEnvironmentEmulator<'_>, profile: &BrowserProfile) {
    if let Some(screen) = env.global_object("screen", ObjectKind::Host) {
        let fields = [
            ("width", profile.screen_width),
            ("height", profile.screen_height),
            ("availWidth", profile.screen_avail_width),
            ("availHeight", profile.screen_avail_height),
            ("colorDepth", profile.color_depth),
            ("pixelDepth", profile.color_depth),
        ];
        for (key, value) in fields {
            env.value(&screen, key, &format!("screen.{key}"), Value::Number(f64::from(value)));
        }
    }
    let global = env.global();
    let fields = [
        ("innerWidth", profile.inner_width),
        ("innerHeight", profile.inner_height),
        ("outerWidth", profile.screen_avail_width),
        ("outerHeight", profile.screen_avail_height),
    ];
    for (key, value) in fields {
        env.value(&global, key, key, Value::Number(f64::from(value)));
    }
    env.value(
        &global,
        "devicePixelRatio",
        "devicePixelRatio",
        Value::Number(profile.device_pixel_ratio),
    );
}

struct UrlParts {
    protocol: String,
    host: String,
    hostname: String,
    port: String,
    pathname: String,
    search: String,
    hash: String,
}

/// Splits an absolute URL into the `location` components.
fn parse_url(url: &str) -> UrlParts {
    let (protocol, rest) = match url.split_once("://") {
        Some((scheme, rest)) => (format!("{scheme}:"), rest),
        None => (String::new(), url),
    };
    let (rest, hash) = match rest.find('#') {
        Some(idx) => (&rest[..idx], rest[idx..].to_string()),
        None => (rest, String::new()),
    };
    let (rest, search) = match rest.find('?') {
        Some(idx) => (&rest[..idx], rest[idx..].to_string()),
        None => (rest, String::new()),
    };
    let (host, pathname) = match rest.find('/') {
        Some(idx) => (&rest[..idx], rest[idx..].to_string()),
        None => (rest, "/".to_string()),
    };
    let (hostname, port) = match host.rsplit_once(':') {
        Some((name, port)) if port.bytes().all(|b| b.is_ascii_digit()) => {
            (name.to_string(), port.to_string())
        }
        _ => (host.to_string(), String::new()),
    };
    UrlParts {
        protocol,
        host: host.to_string(),
        hostname,
        port,
        pathname,
        search,
        hash,
    }
}

fn parse_cookie_header(header: &str) -> Vec<(String, JsString)> {
    header
        .split(';')
        .filter_map(|pair| {
            let (name, value) = pair.split_once('=')?;
            let name = name.trim();
            (!name.is_empty()).then(|| (name.to_string(), JsString::new(value.trim())))
        })
        .collect()
}

fn make_element(rt: &mut Runtime, tag: &str) -> ObjectRef {
    let tag = tag.to_ascii_lowercase();
    let element = rt.new_host_object(
        IdentifierPath::root("window")
            .child("document")
            .child("createElement")
            .called(),
        &rt.realm.element_proto.clone(),
        ObjectKind::Element(ElementState {
            tag,
            attributes: Vec::new(),
        }),
    );
    rt.document.elements.push(element.clone());
    element
}

fn document_write(rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    for arg in &call.args {
        let text = rt.to_js_string(arg)?;
        rt.document.written.push(text);
    }
    Ok(Value::Undefined)
}

fn document_writeln(rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    document_write(rt, call)?;
    rt.document.written.push(JsString::new("\n"));
    Ok(Value::Undefined)
}

fn create_element(rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    let tag = arg_string(call, 0);
    Ok(Value::Object(make_element(rt, tag.as_str())))
}

fn element_attribute(element: &ObjectRef, name: &str) -> Option<JsString> {
    match &element.borrow().kind {
        ObjectKind::Element(state) => state
            .attributes
            .iter()
            .find(|(attr, _)| attr == name)
            .map(|(_, value)| value.clone()),
        _ => None,
    }
}

fn element_tag(element: &ObjectRef) -> Option<String> {
    match &element.borrow().kind {
        ObjectKind::Element(state) => Some(state.tag.clone()),
        _ => None,
    }
}

fn has_class(element: &ObjectRef, class: &str) -> bool {
    element_attribute(element, "class")
        .is_some_and(|classes| classes.as_str().split_whitespace().any(|name| name == class))
}

fn elements_where(rt: &Runtime, predicate: impl Fn(&ObjectRef) -> bool) -> Vec<Value> {
    rt.document
        .elements
        .iter()
        .filter(|element| predicate(element))
        .map(|element| Value::Object(element.clone()))
        .collect()
}

/// Matches `#id`, `.class` and bare tag selectors; anything richer finds
/// nothing.
fn select(rt: &Runtime, selector: &str) -> Vec<Value> {
    let selector = selector.trim();
    if let Some(id) = selector.strip_prefix('#') {
        return elements_where(rt, |element| {
            element_attribute(element, "id").is_some_and(|value| value.as_str() == id)
        });
    }
    if let Some(class) = selector.strip_prefix('.') {
        return elements_where(rt, |element| has_class(element, class));
    }
    if !selector.is_empty() && selector.chars().all(|ch| ch.is_ascii_alphanumeric()) {
        let tag = selector.to_ascii_lowercase();
        return elements_where(rt, |element| element_tag(element).as_deref() == Some(tag.as_str()));
    }
    Vec::new()
}

fn get_element_by_id(rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    let id = arg_string(call, 0);
    Ok(select(rt, &format!("#{}", id.as_str()))
        .into_iter()
        .next()
        .unwrap_or(Value::Null))
}

fn query_selector(rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    let selector = arg_string(call, 0);
    Ok(select(rt, selector.as_str())
        .into_iter()
        .next()
        .unwrap_or(Value::Null))
}

fn query_selector_all(rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    let selector = arg_string(call, 0);
    Ok(Value::array(select(rt, selector.as_str())))
}

fn get_elements_by_tag_name(rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    let tag = arg_string(call, 0).as_str().to_ascii_lowercase();
    if tag == "*" {
        return Ok(Value::array(elements_where(rt, |_| true)));
    }
    Ok(Value::array(elements_where(rt, |element| {
        element_tag(element).as_deref() == Some(tag.as_str())
    })))
}

fn get_elements_by_class_name(rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    let class = arg_string(call, 0);
    Ok(Value::array(elements_where(rt, |element| {
        has_class(element, class.as_str())
    })))
}

fn this_element(rt: &Runtime, call: &NativeCall) -> Result<ObjectRef> {
    match &call.this {
        Value::Object(object) if matches!(object.borrow().kind, ObjectKind::Element(_)) => {
            Ok(object.clone())
        }
        _ => Err(rt.type_error("Illegal invocation")),
    }
}

fn set_attribute(rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    let element = this_element(rt, call)?;
    let name = arg_string(call, 0).as_str().to_ascii_lowercase();
    let value = rt.to_js_string(&call.arg(1))?;
    {
        let mut borrowed = element.borrow_mut();
        if let ObjectKind::Element(state) = &mut borrowed.kind {
            match state.attributes.iter_mut().find(|(attr, _)| *attr == name) {
                Some(slot) => slot.1 = value.clone(),
                None => state.attributes.push((name.clone(), value.clone())),
            }
        }
        match name.as_str() {
            "id" => borrowed.set("id", Value::String(value)),
            "class" => borrowed.set("className", Value::String(value)),
            _ => {}
        }
    }
    Ok(Value::Undefined)
}

fn get_attribute(rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    let element = this_element(rt, call)?;
    let name = arg_string(call, 0).as_str().to_ascii_lowercase();
    Ok(element_attribute(&element, &name).map_or(Value::Null, Value::String))
}

fn has_attribute(rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    let element = this_element(rt, call)?;
    let name = arg_string(call, 0).as_str().to_ascii_lowercase();
    Ok(Value::Bool(element_attribute(&element, &name).is_some()))
}

fn remove_attribute(rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    let element = this_element(rt, call)?;
    let name = arg_string(call, 0).as_str().to_ascii_lowercase();
    if let ObjectKind::Element(state) = &mut element.borrow_mut().kind {
        state.attributes.retain(|(attr, _)| *attr != name);
    }
    Ok(Value::Undefined)
}

fn append_child(rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    this_element(rt, call)?;
    Ok(call.arg(0))
}

fn remove_child(rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    this_element(rt, call)?;
    let child = call.arg(0);
    if let Value::Object(child) = &child {
        rt.document
            .elements
            .retain(|element| !Rc::ptr_eq(element, child));
    }
    Ok(child)
}

fn element_listener_noop(_rt: &mut Runtime, _call: &NativeCall) -> Result<Value> {
    Ok(Value::Undefined)
}

fn location_to_string(rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    rt.get_member(&call.this, "href", None)
}

fn location_navigate(rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    let target = rt.to_js_string(&call.arg(0))?;
    tracing::debug!(target = target.as_str(), "navigation requested");
    Ok(Value::Undefined)
}

fn location_reload(_rt: &mut Runtime, _call: &NativeCall) -> Result<Value> {
    Ok(Value::Undefined)
}

fn this_storage(rt: &Runtime, call: &NativeCall) -> Result<ObjectRef> {
    match &call.this {
        Value::Object(object) if matches!(object.borrow().kind, ObjectKind::Storage(_)) => {
            Ok(object.clone())
        }
        _ => Err(rt.type_error("Illegal invocation")),
    }
}

fn with_items<T>(storage: &ObjectRef, update: impl FnOnce(&mut Vec<(String, Value)>) -> T) -> Option<T> {
    match &mut storage.borrow_mut().kind {
        ObjectKind::Storage(items) => Some(update(items)),
        _ => None,
    }
}

fn storage_get_item(rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    let storage = this_storage(rt, call)?;
    let key = arg_string(call, 0).as_str().to_string();
    Ok(with_items(&storage, |items| {
        items
            .iter()
            .find(|(name, _)| *name == key)
            .map(|(_, value)| value.clone())
    })
    .flatten()
    .unwrap_or(Value::Null))
}

fn storage_set_item(rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    let storage = this_storage(rt, call)?;
    let key = arg_string(call, 0).as_str().to_string();
    let value = Value::String(rt.to_js_string(&call.arg(1))?);
    with_items(&storage, |items| match items.iter_mut().find(|(name, _)| *name == key) {
        Some(slot) => slot.1 = value,
        None => items.push((key, value)),
    });
    Ok(Value::Undefined)
}

fn storage_remove_item(rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    let storage = this_storage(rt, call)?;
    let key = arg_string(call, 0).as_str().to_string();
    with_items(&storage, |items| items.retain(|(name, _)| *name != key));
    Ok(Value::Undefined)
}

fn storage_clear(rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    let storage = this_storage(rt, call)?;
    with_items(&storage, Vec::clear);
    Ok(Value::Undefined)
}

fn storage_key(rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    let storage = this_storage(rt, call)?;
    let index = to_integer(call.arg(0).as_number());
    Ok(with_items(&storage, |items| {
        if index < 0.0 {
            return None;
        }
        items
            .get(index as usize)
            .map(|(name, _)| Value::string(name.as_str()))
    })
    .flatten()
    .unwrap_or(Value::Null))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(src: &str) -> Result<Value> {
        let mut rt = Runtime::new(&AnalysisConfig::default());
        rt.run_script(&format!("var out = {src};"))?;
        rt.get_member(&rt.global_value(), "out", None)
    }

    #[test]
    fn urls_split_into_location_parts() {
        let parts = parse_url("https://shop.test:8443/cart/view?id=7#top");
        assert_eq!(parts.protocol, "https:");
        assert_eq!(parts.host, "shop.test:8443");
        assert_eq!(parts.hostname, "shop.test");
        assert_eq!(parts.port, "8443");
        assert_eq!(parts.pathname, "/cart/view");
        assert_eq!(parts.search, "?id=7");
        assert_eq!(parts.hash, "#top");
        assert_eq!(parse_url("https://a.test").pathname, "/");
    }

    #[test]
    fn location_reflects_the_document_url() -> Result<()> {
        assert_eq!(run("location.hostname")?.as_string(), "example.com");
        assert_eq!(run("document.location.href")?.as_string(), "https://example.com/");
        assert_eq!(run("location.toString()")?.as_string(), "https://example.com/");
        Ok(())
    }

    #[test]
    fn cookies_accumulate_and_keep_taint() -> Result<()> {
        let mut rt = Runtime::new(&AnalysisConfig::default());
        rt.run_script(
            "document.cookie = 'a=1; path=/'; document.cookie = 'b=' + atob('eA=='); var c = document.cookie;",
        )?;
        let Value::String(cookie) = rt.get_member(&rt.global_value(), "c", None)? else {
            panic!("cookie is not a string");
        };
        assert_eq!(cookie.as_str(), "a=1; b=x");
        assert!(!cookie.taint().is_empty());
        Ok(())
    }

    #[test]
    fn cookie_jar_is_bounded() -> Result<()> {
        let mut rt = Runtime::new(&AnalysisConfig::default());
        rt.run_script(
            "document.cookie = 'big=' + 'x'.repeat(5000);\
             for (var i = 0; i < 500; i++) { document.cookie = 'k' + i + '=v'; }",
        )?;
        assert_eq!(rt.document.cookies.len(), 180);
        assert!(rt.document.cookies.iter().all(|(name, _)| name != "big"));
        Ok(())
    }

    #[test]
    fn created_elements_are_queryable() -> Result<()> {
        assert_eq!(
            run("(function () { var d = document.createElement('DIV'); d.setAttribute('id', 'box'); d.className = 'a b'; return document.getElementById('box') === d && document.querySelectorAll('.b').length === 1 && d.tagName; })()")?
                .as_string(),
            "DIV"
        );
        assert_eq!(run("document.getElementsByTagName('body').length")?, Value::Number(1.0));
        assert_eq!(run("document.querySelector('#missing')")?, Value::Null);
        Ok(())
    }

    #[test]
    fn unknown_element_members_fall_back() -> Result<()> {
        let mut rt = Runtime::new(&AnalysisConfig::default());
        rt.run_script("var el = document.createElement('img'); el.style.display = 'none'; var t = typeof el.dataset.x;")?;
        assert_eq!(rt.get_member(&rt.global_value(), "t", None)?.as_string(), "function");
        assert!(
            rt.fallback
                .stub_paths()
                .contains(&"window.document.createElement().dataset".to_string())
        );
        Ok(())
    }

    #[test]
    fn storage_round_trips_items() -> Result<()> {
        assert_eq!(
            run("(function () { localStorage.setItem('k', 5); return localStorage.getItem('k') + localStorage.length + localStorage.key(0); })()")?
                .as_string(),
            "51k"
        );
        assert_eq!(run("sessionStorage.getItem('none')")?, Value::Null);
        Ok(())
    }

    #[test]
    fn document_write_is_captured() -> Result<()> {
        let mut rt = Runtime::new(&AnalysisConfig::default());
        rt.run_script("document.write('<p>', 1); document.writeln('x');")?;
        let written = rt
            .document
            .written
            .iter()
            .map(|text| text.as_str().to_string())
            .collect::<String>();
        assert_eq!(written, "<p>1x\n");
        Ok(())
    }
}
