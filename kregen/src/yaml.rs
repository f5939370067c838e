use serde::de::DeserializeOwned;

pub fn from_str<T>(s: &str) -> anyhow::Result<T>
where
    T: DeserializeOwned,
{
    serde_yaml::from_str(s).map_err(Into::into)
}

pub fn from_reader<R, T>(reader: R) -> anyhow::Result<T>
where
    R: std::io::Read,
    T: DeserializeOwned,
{
    serde_yaml::from_reader(reader).map_err(Into::into)
}

pub fn to_string<T>(value: &T) -> anyhow::Result<String>
where
    T: serde::Serialize,
{
    serde_yaml::to_string(value).map_err(Into::into)
}

pub fn to_writer<W, T>(writer: W, value: &T) -> anyhow::Result<()>
where
    W: std::io::Write,
    T: serde::Serialize,
{
    serde_yaml::to_writer(writer, value).map_err(Into::into)
}
