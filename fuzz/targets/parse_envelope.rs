#![no_main]

use libfuzzer_sys::fuzz_target;
use streamrelay::Envelope;

fuzz_target!(|data: &[u8]| {
    let Ok(raw) = std::str::from_utf8(data) else {
        return;
    };
    // Разбор не должен паниковать; принятый конверт переживает повторную
    // сериализацию без изменений.
    if let Ok(env) = Envelope::parse(raw) {
        let json = env.to_json().expect("parsed envelope must serialize");
        let again = Envelope::parse(&json).expect("serialized envelope must parse");
        assert_eq!(env, again);
    }
});
