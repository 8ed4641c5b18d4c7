use serde_json::Value;
use svcbus_service::ClientConfig;

use crate::cmd::{connect_client, parse_duration, CallArgs};
use crate::exit::{service_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::{print_value, OutputFormat, ValueKind};

pub async fn run(args: CallArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_duration(&args.timeout)?;
    let call_args = parse_call_args(&args.args)?;

    let config = ClientConfig {
        call_timeout: Some(timeout),
    };
    let client = connect_client(&args.path, timeout, config).await?;

    let result: Value = client
        .call(&args.name, call_args)
        .await
        .map_err(|err| service_error("call failed", err))?;
    print_value(ValueKind::Result, &args.name, None, &result, format);

    client.dispose();
    Ok(SUCCESS)
}

fn parse_call_args(input: &str) -> CliResult<Value> {
    let value: Value = serde_json::from_str(input)
        .map_err(|err| CliError::new(USAGE, format!("--args is not valid JSON: {err}")))?;
    if !value.is_array() {
        return Err(CliError::new(USAGE, "--args must be a JSON array"));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn call_args_must_be_an_array() {
        assert_eq!(parse_call_args("[2, 3]").unwrap(), serde_json::json!([2, 3]));
        assert_eq!(parse_call_args("{\"a\":1}").unwrap_err().code, USAGE);
        assert_eq!(parse_call_args("not json").unwrap_err().code, USAGE);
    }
}
